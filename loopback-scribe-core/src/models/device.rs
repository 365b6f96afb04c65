use serde::Serialize;

/// A capture endpoint reported by the platform backend.
///
/// `is_loopback` marks endpoints the platform explicitly exposes as
/// loopback-capable; `is_default` marks the platform's default output
/// endpoint. Serializable so the surrounding shell can list devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub index: usize,
    pub name: String,
    pub channels: u16,
    pub native_rate: u32,
    pub is_loopback: bool,
    pub is_default: bool,
}

/// Which devices a capture session should open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSelector {
    /// Open every listed loopback endpoint.
    All,
    /// Open only the endpoint with this enumeration index.
    Index(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_listing_serializes_for_the_shell() {
        let info = DeviceInfo {
            index: 3,
            name: "Speakers (Loopback)".into(),
            channels: 2,
            native_rate: 48_000,
            is_loopback: true,
            is_default: false,
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["index"], 3);
        assert_eq!(json["name"], "Speakers (Loopback)");
        assert_eq!(json["native_rate"], 48_000);
        assert_eq!(json["is_loopback"], true);
    }
}

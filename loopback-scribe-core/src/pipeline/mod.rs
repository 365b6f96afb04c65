pub(crate) mod accumulate;
pub mod device_stream;
pub(crate) mod dispatch;
pub mod supervisor;

pub mod payload;
pub mod reading;

pub use payload::ForwardPayload;
pub use reading::Reading;

pub mod cancellation;
pub mod title;
pub mod upload;

pub use cancellation::CancellationToken;
pub use title::derive_title;
pub use upload::{UploadController, failure_message};

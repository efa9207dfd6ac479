pub mod confirmation;
pub mod extraction;
pub mod gmail;
pub mod google_calendar;
pub mod inbound_email;
pub mod upload_store;

pub use confirmation::{ConfirmationFlow, EventCreator, LinkDelivery};
pub use extraction::EventExtractor;
pub use upload_store::UploadStore;

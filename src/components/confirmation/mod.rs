mod flow;
pub mod token;

pub use flow::{
    ConfirmationFlow, EventCreator, LinkDelivery, RedeemError, RedeemedEvent,
    DEFAULT_CREATE_TIMEOUT,
};
pub use token::{TokenCodec, TokenError, INVALID_TOKEN_MESSAGE};

//! Wire types shared between the gateway client and the conversation store.

mod chat_request;
mod chat_response;
mod message;
mod model_list;
mod stream_event;

pub use chat_request::ChatRequest;
pub use chat_response::{ChatResponse, ResponseMessage};
pub use message::{Message, Role};
pub use model_list::{ModelInfo, ModelList};
pub use stream_event::{StreamEvent, StreamFragment, StreamPayload};

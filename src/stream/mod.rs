pub mod frame_reader;
pub mod sse;
pub mod translator;

pub use frame_reader::{spawn_frame_reader, FrameSplitter, ReaderSignal};
pub use sse::{encode_sse_event, sse_abort_response, sse_ok_response};
pub use translator::{translated_body, StreamTranslator};

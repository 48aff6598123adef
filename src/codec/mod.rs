//! Wire codec for frames
//!
//! The encoder splits each frame into the header and payload writes that
//! delivery performs in order; the decoder parses complete buffers or an
//! arbitrarily chunked byte stream.

pub mod encoder;
pub mod decoder;

pub use encoder::{encode_frame, encode_header, encode_payload, EncodedFrame, FrameEncoder};
pub use decoder::{decode_frame, FrameDecoder, FrameHeader};

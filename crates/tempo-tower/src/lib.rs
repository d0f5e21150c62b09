#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![doc = include_str!("../README.md")]

mod layer;
mod service;
mod timing;

pub use layer::ServerTimingLayer;
pub use service::{ResponseFuture, ServerTimingService};
pub use timing::SERVER_TIMING;

#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod extension;
pub mod profiler;
pub mod trace;

/// An allocation-optimized string.
pub type SharedString = std::borrow::Cow<'static, str>;

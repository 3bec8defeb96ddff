// Copyright (c) the Helio Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Post-processing and alignment of monochrome astronomical image stacks.
//!
//! The processing pipeline runs Lucy–Richardson deconvolution, one or more
//! unsharp-masking passes and a tone curve over a user selection, with
//! cancellable background execution driven by [`pipeline::Scheduler`]. The
//! [`align`] module registers image sequences via phase correlation or by
//! keeping the solar limb stationary.

#![deny(unsafe_code)]

pub mod align;
pub mod batch;
pub mod config;
pub mod error;
pub mod image;
pub mod io;
pub mod math;
pub mod pipeline;
pub mod proc;
pub mod settings;
pub mod util;
pub mod worker;

pub use error::{Error, Result};

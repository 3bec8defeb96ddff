// Copyright (c) the Helio Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

pub mod histogram;
pub mod lr;
pub mod normalize;
pub mod tcurve;
pub mod unsharp;

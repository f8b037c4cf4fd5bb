// Copyright 2020 Google LLC
//
// Use of this source code is governed by an MIT-style license that can be found
// in the LICENSE file or at https://opensource.org/licenses/MIT.

//! Find-style queries and automated policies over indexed filesystem
//! metadata.
//!
//! Query expressions ([`query`]) compile into filter trees ([`filter`])
//! that backends ([`backend`]) answer. The [`find`] command prints or acts
//! on matching entries; [`policy`] runs ordered rules over an index,
//! re-validating every entry against the live filesystem before acting.

pub mod backend;
pub mod filter;
pub mod find;
pub mod fs;
pub mod policy;
pub mod query;

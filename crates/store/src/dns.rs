// SPDX-License-Identifier: MIT

//! The bounded recent-queries ring the embedded DNS resolver reports
//! through the RPC surface (spec §3, "recent DNS queries").

use serde::{Deserialize, Serialize};

/// One entry in the recent-queries ring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsQuery {
    pub name: String,
    pub query_type: String,
    pub answer: Option<String>,
    pub epoch_ms: u64,
}

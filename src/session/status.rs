//! Session status and the legal transition graph.
//!
//! `waiting → scanned → approved | rejected` with `expired` reachable from any
//! non-terminal state. Terminal states never transition again; expiry always
//! wins over a competing transition.

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Lifecycle status of an authentication session.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Created, QR not yet acted on.
    Waiting,
    /// Device opened the QR but has not decided yet.
    Scanned,
    /// Device approved; a session token exists.
    Approved,
    /// Device explicitly declined.
    Rejected,
    /// TTL elapsed before a decision.
    Expired,
}

impl Status {
    /// Terminal states admit no further transition.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Expired)
    }

    /// Whether the state graph permits moving from `self` to `next`.
    ///
    /// `waiting → approved|rejected` is allowed directly because the scanned
    /// step is informational and devices may skip reporting it.
    #[must_use]
    pub const fn allows(self, next: Self) -> bool {
        match self {
            Self::Waiting => matches!(
                next,
                Self::Scanned | Self::Approved | Self::Rejected | Self::Expired
            ),
            Self::Scanned => matches!(next, Self::Approved | Self::Rejected | Self::Expired),
            Self::Approved | Self::Rejected | Self::Expired => false,
        }
    }

    /// Position along the state graph, used by the poller to detect and
    /// discard out-of-order status observations.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Waiting => 0,
            Self::Scanned => 1,
            Self::Approved | Self::Rejected | Self::Expired => 2,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Scanned => "scanned",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Contract lifecycle states, actor roles and the transition table
//!
//! The table below is the single source of truth for which status writes are
//! legal. Every operation that mutates `Contract::status` must pass through
//! [`is_legal_transition`] against the freshly loaded contract before writing.

use std::fmt;
use std::str::FromStr;

use super::error::Error;

/// Position of a contract in its lifecycle.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    #[n(0)]
    Created,
    #[n(1)]
    Assigned,
    #[n(2)]
    Funded,
    #[n(3)]
    Submitted,
    #[n(4)]
    Approved,
    #[n(5)]
    Paid,
    #[n(6)]
    Disputed,
    #[n(7)]
    Resolved,
}

impl Status {
    pub const ALL: [Status; 8] = [
        Status::Created,
        Status::Assigned,
        Status::Funded,
        Status::Submitted,
        Status::Approved,
        Status::Paid,
        Status::Disputed,
        Status::Resolved,
    ];

    /// Terminal statuses accept no further transition of any kind.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Paid | Status::Resolved)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Created => "Created",
            Status::Assigned => "Assigned",
            Status::Funded => "Funded",
            Status::Submitted => "Submitted",
            Status::Approved => "Approved",
            Status::Paid => "Paid",
            Status::Disputed => "Disputed",
            Status::Resolved => "Resolved",
        };
        write!(f, "{name}")
    }
}

/// Shadow of the external payment rail. Informational only: contract
/// progression is decided by [`Status`], never by this field.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscrowStatus {
    #[n(0)]
    NotFunded,
    #[n(1)]
    Funded,
    #[n(2)]
    Refunded,
}

impl fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EscrowStatus::NotFunded => "NotFunded",
            EscrowStatus::Funded => "Funded",
            EscrowStatus::Refunded => "Refunded",
        };
        write!(f, "{name}")
    }
}

/// Caller role as resolved by the authentication layer before the core runs.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    #[n(0)]
    Client,
    #[n(1)]
    Freelancer,
    #[n(2)]
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Client, Role::Freelancer, Role::Admin];
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Client => "client",
            Role::Freelancer => "freelancer",
            Role::Admin => "admin",
        };
        write!(f, "{name}")
    }
}

impl FromStr for Role {
    type Err = Error;

    // roles arrive from the outside in mixed casing, normalise once here
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "client" => Ok(Role::Client),
            "freelancer" => Ok(Role::Freelancer),
            "admin" => Ok(Role::Admin),
            other => Err(Error::invalid_input(format!("unknown role: {other}"))),
        }
    }
}

/// One row of the transition table: the statuses reachable from `state` and
/// the roles allowed to move the contract out of it.
#[derive(Debug)]
pub struct TransitionRule {
    pub state: Status,
    pub next: &'static [Status],
    pub roles: &'static [Role],
}

// Rows are ordered by Status discriminant so lookup is a straight index.
pub static TRANSITIONS: [TransitionRule; 8] = [
    TransitionRule {
        state: Status::Created,
        next: &[Status::Assigned],
        roles: &[Role::Client],
    },
    TransitionRule {
        state: Status::Assigned,
        next: &[Status::Funded],
        roles: &[Role::Client],
    },
    TransitionRule {
        state: Status::Funded,
        next: &[Status::Submitted, Status::Disputed],
        roles: &[Role::Client, Role::Freelancer],
    },
    TransitionRule {
        state: Status::Submitted,
        next: &[Status::Approved, Status::Disputed],
        roles: &[Role::Client, Role::Freelancer],
    },
    TransitionRule {
        state: Status::Approved,
        next: &[Status::Paid],
        roles: &[Role::Client],
    },
    TransitionRule {
        state: Status::Paid,
        next: &[],
        roles: &[],
    },
    TransitionRule {
        state: Status::Disputed,
        next: &[Status::Resolved, Status::Paid],
        roles: &[Role::Admin],
    },
    TransitionRule {
        state: Status::Resolved,
        next: &[],
        roles: &[],
    },
];

pub fn rule_for(status: Status) -> &'static TransitionRule {
    &TRANSITIONS[status as usize]
}

/// Pure legality check: `requested` must be reachable from `current` and the
/// role must be allowed to act on `current`. Ownership checks (is this THE
/// client of the contract, is this THE assigned freelancer) are layered on
/// top by the service and are deliberately not part of this function.
pub fn is_legal_transition(current: Status, requested: Status, role: Role) -> bool {
    let rule = rule_for(current);
    rule.next.contains(&requested) && rule.roles.contains(&role)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_indexed_by_discriminant() {
        for status in Status::ALL {
            assert_eq!(rule_for(status).state, status);
        }
    }

    #[test]
    fn forward_edges() {
        assert!(is_legal_transition(
            Status::Created,
            Status::Assigned,
            Role::Client
        ));
        assert!(is_legal_transition(
            Status::Assigned,
            Status::Funded,
            Role::Client
        ));
        assert!(is_legal_transition(
            Status::Funded,
            Status::Submitted,
            Role::Freelancer
        ));
        assert!(is_legal_transition(
            Status::Submitted,
            Status::Approved,
            Role::Client
        ));
        assert!(is_legal_transition(
            Status::Approved,
            Status::Paid,
            Role::Client
        ));
        assert!(is_legal_transition(
            Status::Disputed,
            Status::Resolved,
            Role::Admin
        ));
        assert!(is_legal_transition(
            Status::Disputed,
            Status::Paid,
            Role::Admin
        ));
    }

    #[test]
    fn disputes_open_from_funded_and_submitted_only() {
        for status in Status::ALL {
            let legal = is_legal_transition(status, Status::Disputed, Role::Client);
            assert_eq!(
                legal,
                matches!(status, Status::Funded | Status::Submitted),
                "dispute edge from {status}"
            );
        }
    }

    #[test]
    fn skipping_states_is_rejected() {
        assert!(!is_legal_transition(
            Status::Created,
            Status::Funded,
            Role::Client
        ));
        assert!(!is_legal_transition(
            Status::Assigned,
            Status::Paid,
            Role::Client
        ));
        assert!(!is_legal_transition(
            Status::Funded,
            Status::Approved,
            Role::Client
        ));
    }

    #[test]
    fn role_gates_hold() {
        assert!(!is_legal_transition(
            Status::Created,
            Status::Assigned,
            Role::Freelancer
        ));
        assert!(!is_legal_transition(
            Status::Assigned,
            Status::Funded,
            Role::Admin
        ));
        assert!(!is_legal_transition(
            Status::Disputed,
            Status::Resolved,
            Role::Client
        ));
    }

    #[test]
    fn terminal_states_have_no_edges() {
        for status in [Status::Paid, Status::Resolved] {
            assert!(status.is_terminal());
            let rule = rule_for(status);
            assert!(rule.next.is_empty());
            assert!(rule.roles.is_empty());
        }
    }

    #[test]
    fn role_parsing_is_case_insensitive() {
        assert_eq!("CLIENT".parse::<Role>().unwrap(), Role::Client);
        assert_eq!("Freelancer".parse::<Role>().unwrap(), Role::Freelancer);
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert!("moderator".parse::<Role>().is_err());
    }

    #[test]
    fn status_roundtrip() {
        for status in Status::ALL {
            let bytes = minicbor::to_vec(status).unwrap();
            let decoded: Status = minicbor::decode(&bytes).unwrap();
            assert_eq!(status, decoded);
        }
    }
}

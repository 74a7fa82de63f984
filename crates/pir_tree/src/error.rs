//! Errors raised by the declaration graph.

use crate::ids::DeclId;
use crate::signature::Signature;
use crate::stage::Stage;

/// Errors from assigning or registering signatures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// Two declarations claim the same signature in one session.
    #[error("signature {signature} is already bound to {existing}, cannot bind {incoming}")]
    Conflict {
        /// The contested signature.
        signature: Signature,
        /// The declaration that already holds it.
        existing: DeclId,
        /// The declaration that tried to take it.
        incoming: DeclId,
    },

    /// The declaration has no stable identity (anonymous, or its parent has none).
    #[error("{decl} cannot be addressed across sessions: {reason}")]
    NotAddressable {
        /// The declaration.
        decl: DeclId,
        /// Why no signature can be computed.
        reason: String,
    },

    /// The declaration or one of its ancestors could not be read.
    #[error(transparent)]
    Carrier(#[from] CarrierError),
}

/// Errors from reading or writing carriers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CarrierError {
    /// The ID refers to an unbound symbol or was not allocated by this session.
    #[error("{decl} is not a bound declaration")]
    NotBound {
        /// The declaration.
        decl: DeclId,
    },

    /// The declaration has no carrier at or before the requested stage.
    #[error("{decl} has no carrier at {stage}")]
    NoCarrierAt {
        /// The declaration.
        decl: DeclId,
        /// The requested stage.
        stage: Stage,
    },

    /// A write was attempted at a stage older than the newest carrier.
    #[error("cannot write {decl} at {stage}: newest carrier is at {latest}")]
    StageRegression {
        /// The declaration.
        decl: DeclId,
        /// The stage of the attempted write.
        stage: Stage,
        /// The stage of the newest carrier.
        latest: Stage,
    },

    /// A carrier of another kind was supplied for the declaration.
    #[error("{decl} is a {expected} but a {actual} carrier was supplied")]
    KindMismatch {
        /// The declaration.
        decl: DeclId,
        /// The declaration's kind.
        expected: crate::decl::DeclKind,
        /// The carrier's kind.
        actual: crate::decl::DeclKind,
    },

    /// A carrier history that is not strictly ordered by stage was supplied.
    #[error("carrier history of {decl} is not ordered by stage")]
    UnorderedHistory {
        /// The declaration.
        decl: DeclId,
    },

    /// Body access while bodies are disabled.
    #[error("bodies are disabled at {stage}, cannot touch body of {decl}")]
    BodiesDisabled {
        /// The declaration.
        decl: DeclId,
        /// The current stage.
        stage: Stage,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_display_names_both_declarations() {
        let err = SignatureError::Conflict {
            signature: Signature::top_level("lib", "f"),
            existing: DeclId::from_raw(1),
            incoming: DeclId::from_raw(2),
        };
        let msg = err.to_string();
        assert!(msg.contains("lib/f"));
        assert!(msg.contains("decl#1"));
        assert!(msg.contains("decl#2"));
    }

    #[test]
    fn stage_regression_display() {
        let err = CarrierError::StageRegression {
            decl: DeclId::from_raw(4),
            stage: Stage::new(1),
            latest: Stage::new(3),
        };
        let msg = err.to_string();
        assert!(msg.contains("stage 1"));
        assert!(msg.contains("stage 3"));
    }
}

//! Send gating.
//!
//! A turn may only go out when the credential, the deployment key, the user
//! input and every required template variable are present at the same time.

use std::collections::BTreeSet;

use crate::session::Session;

/// Why a send was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateRejection {
    MissingCredential,
    MissingDeployment,
    EmptyInput,
    /// Bound variable names differ from the required names.
    VariableMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },
}

/// Check whether `input` may be sent for `session`.
///
/// Variables are matched by name: the set of bound names must equal the set
/// of `required` names. Values are not inspected beyond being non-empty at
/// bind time.
pub fn evaluate(session: &Session, required: &[String], input: &str) -> Result<(), GateRejection> {
    check_presence(session, input)?;
    check_variables(session, required)
}

/// Credential, deployment key and input, which need no remote lookup.
pub fn check_presence(session: &Session, input: &str) -> Result<(), GateRejection> {
    if session.credential().is_none() {
        return Err(GateRejection::MissingCredential);
    }
    if session.deployment().key.is_empty() {
        return Err(GateRejection::MissingDeployment);
    }
    if input.is_empty() {
        return Err(GateRejection::EmptyInput);
    }
    Ok(())
}

/// Bound variable names against the deployment's declared names.
pub fn check_variables(session: &Session, required: &[String]) -> Result<(), GateRejection> {
    let required: BTreeSet<&str> = required.iter().map(String::as_str).collect();
    let bound: BTreeSet<&str> = session
        .variable_bindings()
        .keys()
        .map(String::as_str)
        .collect();
    if required != bound {
        return Err(GateRejection::VariableMismatch {
            missing: required.difference(&bound).map(|s| s.to_string()).collect(),
            unexpected: bound.difference(&required).map(|s| s.to_string()).collect(),
        });
    }
    Ok(())
}

/// Pure predicate form of [`evaluate`].
pub fn can_send(session: &Session, required: &[String], input: &str) -> bool {
    evaluate(session, required, input).is_ok()
}

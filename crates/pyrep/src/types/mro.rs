//! C3 linearization.

use std::sync::Arc;

use crate::{
    config::RuntimeConfig,
    exception::{ExcType, RunResult},
    types::TypeRef,
};

/// Computes the MRO of a new type with the given bases, excluding the type itself.
///
/// The new type does not exist yet when this runs, so the result is the C3
/// merge of the bases' MROs and the base list; the caller prepends the type.
/// Errors (all TypeError) cover duplicate bases, inconsistent orderings and
/// the configured depth and length limits.
pub(crate) fn compute_c3_mro(bases: &[TypeRef], config: &RuntimeConfig) -> RunResult<Vec<TypeRef>> {
    for (i, base) in bases.iter().enumerate() {
        if bases[..i].iter().any(|other| Arc::ptr_eq(other, base)) {
            return Err(ExcType::type_error(format!("duplicate base class {}", base.name())));
        }
    }

    // Collect the MROs of all base classes
    let mut linearizations: Vec<Vec<TypeRef>> = Vec::with_capacity(bases.len() + 1);
    for base in bases {
        let lin: Vec<TypeRef> = base.mro().cloned().collect();
        if lin.len() > config.max_inheritance_depth {
            return Err(ExcType::type_error(format!(
                "inheritance chain too deep (maximum depth {})",
                config.max_inheritance_depth
            )));
        }
        linearizations.push(lin);
    }

    // Add the list of bases itself as the last sequence to merge
    linearizations.push(bases.to_vec());

    let mut result: Vec<TypeRef> = Vec::new();
    loop {
        linearizations.retain(|l| !l.is_empty());
        if linearizations.is_empty() {
            break;
        }

        // A good head does not appear in the tail of any list
        let found = linearizations.iter().map(|lin| &lin[0]).find(|candidate| {
            !linearizations
                .iter()
                .any(|other| other[1..].iter().any(|t| Arc::ptr_eq(t, candidate)))
        });

        let Some(next) = found.cloned() else {
            let base_names: Vec<&str> = bases.iter().map(|b| b.name()).collect();
            return Err(ExcType::type_error(format!(
                "Cannot create a consistent method resolution order (MRO) for bases {}",
                base_names.join(", ")
            )));
        };

        for lin in &mut linearizations {
            if Arc::ptr_eq(&lin[0], &next) {
                lin.remove(0);
            }
        }
        result.push(next);

        if result.len() + 1 > config.max_mro_length {
            return Err(ExcType::type_error(format!(
                "method resolution order too long (maximum length {})",
                config.max_mro_length
            )));
        }
    }

    Ok(result)
}

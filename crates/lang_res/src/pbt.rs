//! Property-based tests for the constraint algebra.

use la_arena::RawIdx;
use proptest::collection::vec;
use proptest::prelude::{prop_assert, prop_assert_eq, prop_oneof, proptest, Just, Strategy};

use crate::coefficient::{CoeffId, Coefficient};
use crate::constraints::{Constraint, Sum};

/// Coefficients drawn from a small fixed pool of unknown ids plus small
/// constants. Identity semantics make a real arena unnecessary here.
fn arb_coeff() -> impl Strategy<Value = Coefficient> {
    prop_oneof![
        (0u32..8).prop_map(|i| Coefficient::Unknown(CoeffId::from_raw(RawIdx::from(i)))),
        (-4i64..=4).prop_map(Coefficient::known),
    ]
}

fn arb_sum() -> impl Strategy<Value = Sum> {
    vec(arb_coeff(), 1..4).prop_map(Sum::new)
}

fn arb_constraint() -> impl Strategy<Value = Constraint> {
    let leaf = prop_oneof![
        (arb_sum(), arb_sum()).prop_map(|(lhs, rhs)| Constraint::eq(lhs, rhs)),
        (arb_sum(), arb_sum()).prop_map(|(lhs, rhs)| Constraint::le(lhs, rhs)),
        (arb_sum(), arb_sum()).prop_map(|(lhs, rhs)| Constraint::ge(lhs, rhs)),
        Just(Constraint::unsat("generated")),
    ];
    leaf.prop_recursive(3, 16, 4, |inner| {
        vec(inner, 1..4).prop_map(Constraint::conj)
    })
}

proptest! {
    /// After `replace(a, b)` the target never occurs, unless it was the
    /// replacement too.
    #[test]
    fn replace_eliminates_the_target(
        constraint in arb_constraint(),
        a in arb_coeff(),
        b in arb_coeff(),
    ) {
        let replaced = constraint.replace(a, b);
        prop_assert!(!replaced.occurring().contains(&a) || a == b);
    }

    /// Replacing a coefficient by itself is the identity.
    #[test]
    fn replace_by_self_is_identity(constraint in arb_constraint(), a in arb_coeff()) {
        prop_assert_eq!(constraint.replace(a, a), constraint);
    }

    /// A conjunction mentions exactly the union of its children's
    /// coefficients.
    #[test]
    fn conj_occurring_is_union_of_children(children in vec(arb_constraint(), 1..5)) {
        let mut expected = rustc_hash::FxHashSet::default();
        for child in &children {
            expected.extend(child.occurring());
        }
        let conj = Constraint::conj(children);
        prop_assert_eq!(conj.occurring(), expected);
    }

    /// Replacement never changes how many atoms a constraint has.
    #[test]
    fn replace_preserves_shape(
        constraint in arb_constraint(),
        a in arb_coeff(),
        b in arb_coeff(),
    ) {
        prop_assert_eq!(constraint.replace(a, b).atoms().len(), constraint.atoms().len());
    }
}

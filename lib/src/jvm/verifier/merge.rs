use super::{join, AbstractState, IncompatibleTypes, VerificationType, VerifierErrorKind};
use crate::jvm::class_graph::LeastUpperBound;

/// Join an incoming state into the state already recorded at a position
///
/// Returns whether any slot of `existing` was widened, in which case `existing` is also marked
/// dirty. On failure, `existing` may have been partially widened.
pub fn merge(
    existing: &mut AbstractState,
    incoming_height: u16,
    incoming_slots: &[VerificationType],
    lub: &dyn LeastUpperBound,
) -> Result<bool, VerifierErrorKind> {
    if incoming_height != existing.stack_height {
        return Err(VerifierErrorKind::HeightMismatchAtMerge {
            existing: existing.stack_height,
            incoming: incoming_height,
        });
    }

    let mut changed = false;
    for (slot, (current, incoming)) in existing.slots.iter_mut().zip(incoming_slots).enumerate() {
        let (joined, slot_changed) = join(current, incoming, lub).map_err(
            |IncompatibleTypes { existing, incoming }| VerifierErrorKind::IncompatibleMerge {
                slot,
                existing,
                incoming,
            },
        )?;
        if slot_changed {
            *current = joined;
            changed = true;
        }
    }

    if changed {
        existing.dirty = true;
    }
    Ok(changed)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_graph::{ClassGraph, ClassGraphArenas, DeclaredClass};
    use crate::jvm::{ParseDescriptor, RefType};
    use VerificationType::*;

    fn reference(descriptor: &str) -> VerificationType {
        Reference(RefType::parse(descriptor).unwrap())
    }

    fn with_animals(test: impl FnOnce(&ClassGraph)) {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        graph.insert_java_library_types();
        graph.insert_declared_classes(&[
            DeclaredClass::new("Animal", Some("java/lang/Object"), false).unwrap(),
            DeclaredClass::new("Dog", Some("Animal"), false).unwrap(),
            DeclaredClass::new("Cat", Some("Animal"), false).unwrap(),
        ]);
        test(&graph)
    }

    fn settled(locals: &[VerificationType], stack: &[VerificationType]) -> AbstractState {
        let mut state = AbstractState::new(8, locals.len() as u16, 2);
        for (index, local) in locals.iter().enumerate() {
            state.set_local(index as u16, local.clone());
        }
        for value in stack {
            state.push(value.clone()).unwrap();
        }
        state.dirty = false;
        state
    }

    #[test]
    fn merging_into_itself_is_a_no_op() {
        with_animals(|graph| {
            let mut state = settled(&[Integer, Uninitialized], &[reference("LDog;"), Null]);
            let copy = state.clone();
            assert_eq!(merge(&mut state, copy.stack_height, &copy.slots, graph), Ok(false));
            assert_eq!(state, copy);
            assert!(!state.dirty);
        })
    }

    #[test]
    fn height_mismatch() {
        with_animals(|graph| {
            let mut state = settled(&[], &[Integer]);
            let incoming = settled(&[], &[Integer, Integer]);
            assert_eq!(
                merge(&mut state, incoming.stack_height, &incoming.slots, graph),
                Err(VerifierErrorKind::HeightMismatchAtMerge {
                    existing: 1,
                    incoming: 2
                })
            );
        })
    }

    #[test]
    fn subclasses_widen_once() {
        with_animals(|graph| {
            let mut state = settled(&[], &[reference("LDog;")]);
            let cat = settled(&[], &[reference("LCat;")]);

            assert_eq!(merge(&mut state, 1, &cat.slots, graph), Ok(true));
            assert!(state.dirty);
            assert_eq!(state.stack(), &[reference("LAnimal;")]);

            state.dirty = false;
            assert_eq!(merge(&mut state, 1, &cat.slots, graph), Ok(false));
            assert!(!state.dirty);
        })
    }

    #[test]
    fn uninitialized_local() {
        with_animals(|graph| {
            let mut state = settled(&[Integer], &[]);
            let skipped = settled(&[Uninitialized], &[]);
            assert_eq!(merge(&mut state, 0, &skipped.slots, graph), Ok(true));
            assert_eq!(state.locals(), &[Uninitialized]);
        })
    }

    #[test]
    fn incompatible_slot() {
        with_animals(|graph| {
            let mut state = settled(&[Float, Integer], &[]);
            let incoming = settled(&[Float, reference("LDog;")], &[]);
            assert_eq!(
                merge(&mut state, 0, &incoming.slots, graph),
                Err(VerifierErrorKind::IncompatibleMerge {
                    slot: 1,
                    existing: Integer,
                    incoming: reference("LDog;")
                })
            );
        })
    }
}

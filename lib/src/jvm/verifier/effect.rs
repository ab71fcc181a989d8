use super::{
    return_signature, symbolic_signature, AbstractState, ConstantResolver, Instruction, Signature,
    Token, VerificationType, VerifierErrorKind,
};
use crate::jvm::opcodes::{Flow, LocalKind, LocalMode};
use crate::jvm::{BinaryName, FieldType, RefType, RenderDescriptor};
use crate::util::Width;

/// Method-wide information needed to interpret instructions
#[derive(Clone, Copy)]
pub struct MethodContext<'a> {
    pub constants: &'a dyn ConstantResolver,

    /// Declared return type (`None` for `void`)
    pub return_type: Option<&'a FieldType<BinaryName>>,
}

/// Value taken off the stack, either a single slot or both halves of a `long` or `double`
#[derive(Debug, Clone, PartialEq, Eq)]
enum Popped {
    Single(VerificationType),
    Pair(VerificationType, VerificationType),
}

/// Apply the effect of one instruction to the state before it
///
/// On success, `state` has become the state after the instruction. On failure, `state` is left
/// in an unspecified (but valid) condition.
pub fn apply_effect(
    state: &mut AbstractState,
    instruction: &Instruction,
    context: &MethodContext,
) -> Result<(), VerifierErrorKind> {
    let description = instruction.description;
    if description.flow == Flow::Subroutine {
        return Err(VerifierErrorKind::UnsupportedOpcode(description.mnemonic));
    }
    if description.is_return() && return_signature(context.return_type) != description.signature
    {
        let declared = match context.return_type {
            None => String::from("void"),
            Some(typ) => typ.render(),
        };
        return Err(VerifierErrorKind::ReturnTypeMismatch {
            declared,
            mnemonic: description.mnemonic,
        });
    }

    let signature = match description.symbolic {
        Some(symbolic) => {
            Signature::parse(&symbolic_signature(symbolic, instruction, context.constants)?)?
        }
        None => Signature::parse(description.signature)?,
    };

    match (description.local, instruction.local_index()) {
        (Some(access), Some(index)) => match access.mode {
            LocalMode::Load => load_local(state, access.kind, index)?,
            LocalMode::Store => store_local(state, &signature, access.kind, index)?,
            LocalMode::Increment => increment_local(state, index)?,
        },
        _ => {
            let popped = pop_all(state, &signature.pops)?;
            push_all(state, &signature.pushes, &popped)?;
        }
    }

    check_stack_pairs(state)
}

/// Pop every token, returning popped values deepest first
fn pop_all(state: &mut AbstractState, pops: &[Token]) -> Result<Vec<Popped>, VerifierErrorKind> {
    let mut popped = Vec::with_capacity(pops.len());
    for token in pops.iter().rev() {
        popped.push(pop_token(state, token)?);
    }
    popped.reverse();
    Ok(popped)
}

fn pop_token(state: &mut AbstractState, token: &Token) -> Result<Popped, VerifierErrorKind> {
    use VerificationType::*;

    match token {
        Token::Long => pop_pair(state, token, LongHigh, LongLow),
        Token::Double => pop_pair(state, token, DoubleHigh, DoubleLow),
        _ => {
            let value = pop_value(state)?;
            let matches = match token {
                Token::Int => value == Integer,
                Token::Float => value == Float,
                Token::AnyReference | Token::Reference(_) => value.is_reference(),
                Token::Null => value == Null,
                Token::AnySlot => true,
                Token::Long | Token::Double | Token::Copy(_) | Token::Component => false,
            };
            if matches {
                Ok(Popped::Single(value))
            } else {
                Err(mismatch(token, value))
            }
        }
    }
}

fn pop_pair(
    state: &mut AbstractState,
    token: &Token,
    high: VerificationType,
    low: VerificationType,
) -> Result<Popped, VerifierErrorKind> {
    let low_value = pop_value(state)?;
    if low_value != low {
        return Err(mismatch(token, low_value));
    }
    let high_value = pop_value(state)?;
    if high_value != high {
        return Err(mismatch(token, high_value));
    }
    Ok(Popped::Pair(high_value, low_value))
}

fn pop_value(state: &mut AbstractState) -> Result<VerificationType, VerifierErrorKind> {
    match state.pop()? {
        VerificationType::Top => Err(VerifierErrorKind::UnreachableValueUse),
        value => Ok(value),
    }
}

fn mismatch(token: &Token, found: VerificationType) -> VerifierErrorKind {
    VerifierErrorKind::StackTypeMismatch {
        expected: token.to_string(),
        found,
    }
}

fn push_all(
    state: &mut AbstractState,
    pushes: &[Token],
    popped: &[Popped],
) -> Result<(), VerifierErrorKind> {
    use VerificationType::*;

    for token in pushes {
        match token {
            Token::Int => state.push(Integer)?,
            Token::Float => state.push(Float)?,
            Token::Long => {
                state.push(LongHigh)?;
                state.push(LongLow)?;
            }
            Token::Double => {
                state.push(DoubleHigh)?;
                state.push(DoubleLow)?;
            }
            Token::AnyReference => state.push(Reference(RefType::Object(BinaryName::OBJECT)))?,
            Token::Null => state.push(Null)?,
            Token::Reference(ref_type) => state.push(Reference(ref_type.clone()))?,
            Token::Copy(n) => match popped.get(*n as usize - 1) {
                Some(Popped::Single(value)) => state.push(value.clone())?,
                Some(Popped::Pair(high, low)) => {
                    state.push(high.clone())?;
                    state.push(low.clone())?;
                }
                None => return Err(malformed_push(token)),
            },
            Token::Component => match popped.first() {
                Some(Popped::Single(Null)) => state.push(Null)?,
                Some(Popped::Single(Reference(array))) => match array.component_type() {
                    Some(component) => {
                        for slot in VerificationType::from_field_type(&component) {
                            state.push(slot)?;
                        }
                    }
                    None => {
                        return Err(VerifierErrorKind::StackTypeMismatch {
                            expected: String::from("["),
                            found: Reference(array.clone()),
                        })
                    }
                },
                _ => return Err(malformed_push(token)),
            },
            Token::AnySlot => return Err(malformed_push(token)),
        }
    }
    Ok(())
}

fn malformed_push(token: &Token) -> VerifierErrorKind {
    VerifierErrorKind::MalformedSignature(format!("cannot push {}", token))
}

/// Does a local slot hold (one half of) the given kind of value?
fn has_kind(slot: &VerificationType, kind: LocalKind, half: usize) -> bool {
    use VerificationType::*;

    match (kind, half) {
        (LocalKind::Int, _) => *slot == Integer,
        (LocalKind::Float, _) => *slot == Float,
        (LocalKind::Reference, _) => slot.is_reference(),
        (LocalKind::Long, 0) => *slot == LongHigh,
        (LocalKind::Long, _) => *slot == LongLow,
        (LocalKind::Double, 0) => *slot == DoubleHigh,
        (LocalKind::Double, _) => *slot == DoubleLow,
    }
}

fn check_local_range(
    state: &AbstractState,
    kind: LocalKind,
    index: u16,
) -> Result<(), VerifierErrorKind> {
    if index as usize + kind.width() > state.max_locals as usize {
        Err(VerifierErrorKind::LocalIndexOutOfRange {
            index,
            max_locals: state.max_locals,
        })
    } else {
        Ok(())
    }
}

/// Push the current value of a local
fn load_local(
    state: &mut AbstractState,
    kind: LocalKind,
    index: u16,
) -> Result<(), VerifierErrorKind> {
    check_local_range(state, kind, index)?;
    let slots: Vec<VerificationType> = state.locals()[index as usize..]
        .iter()
        .take(kind.width())
        .cloned()
        .collect();

    for (half, slot) in slots.iter().enumerate() {
        match slot {
            VerificationType::Uninitialized => {
                return Err(VerifierErrorKind::UninitializedRead { index })
            }
            VerificationType::Top => return Err(VerifierErrorKind::UnreachableValueUse),
            _ if !has_kind(slot, kind, half) => {
                return Err(VerifierErrorKind::LocalTypeMismatch {
                    index,
                    expected: kind,
                    found: slot.clone(),
                })
            }
            _ => (),
        }
    }

    for slot in slots {
        state.push(slot)?;
    }
    Ok(())
}

/// Pop a value into a local
///
/// The local (both of them for `long` and `double`) must either be unassigned or already hold
/// the same kind of value.
fn store_local(
    state: &mut AbstractState,
    signature: &Signature,
    kind: LocalKind,
    index: u16,
) -> Result<(), VerifierErrorKind> {
    check_local_range(state, kind, index)?;
    let popped = pop_all(state, &signature.pops)?;

    for half in 0..kind.width() {
        let existing = &state.locals()[index as usize + half];
        if *existing != VerificationType::Uninitialized && !has_kind(existing, kind, half) {
            return Err(VerifierErrorKind::LocalTypeMismatch {
                index,
                expected: kind,
                found: existing.clone(),
            });
        }
    }

    match popped.into_iter().next() {
        Some(Popped::Single(value)) => state.set_local(index, value),
        Some(Popped::Pair(high, low)) => {
            state.set_local(index, high);
            state.set_local(index + 1, low);
        }
        None => {
            let msg = format!("store with nothing popped: {:?}", signature);
            return Err(VerifierErrorKind::MalformedSignature(msg));
        }
    }
    Ok(())
}

fn increment_local(state: &mut AbstractState, index: u16) -> Result<(), VerifierErrorKind> {
    check_local_range(state, LocalKind::Int, index)?;
    match &state.locals()[index as usize] {
        VerificationType::Integer => Ok(()),
        VerificationType::Uninitialized => Err(VerifierErrorKind::UninitializedRead { index }),
        VerificationType::Top => Err(VerifierErrorKind::UnreachableValueUse),
        other => Err(VerifierErrorKind::LocalTypeMismatch {
            index,
            expected: LocalKind::Int,
            found: other.clone(),
        }),
    }
}

/// Check that no `long` or `double` on the stack has been split up
fn check_stack_pairs(state: &AbstractState) -> Result<(), VerifierErrorKind> {
    use VerificationType::*;

    let stack = state.stack();
    let mut i = 0;
    while i < stack.len() {
        let (expected, low) = match &stack[i] {
            LongHigh => ("J", LongLow),
            DoubleHigh => ("D", DoubleLow),
            LongLow => ("J", Empty),
            DoubleLow => ("D", Empty),
            _ => {
                i += 1;
                continue;
            }
        };
        match stack.get(i + 1) {
            Some(next) if low != Empty && *next == low => i += 2,
            next => {
                let found = if low == Empty {
                    stack[i].clone()
                } else {
                    next.cloned().unwrap_or(Empty)
                };
                return Err(VerifierErrorKind::StackTypeMismatch {
                    expected: String::from(expected),
                    found,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::super::operands::test::fake_constants;
    use super::super::NoConstants;
    use super::*;
    use crate::jvm::ParseDescriptor;
    use VerificationType::*;

    fn reference(descriptor: &str) -> VerificationType {
        Reference(RefType::parse(descriptor).unwrap())
    }

    fn state(locals: &[VerificationType], stack: &[VerificationType]) -> AbstractState {
        let mut state = AbstractState::new(0, locals.len() as u16, 6);
        for (index, local) in locals.iter().enumerate() {
            state.set_local(index as u16, local.clone());
        }
        for value in stack {
            state.push(value.clone()).unwrap();
        }
        state
    }

    fn run_with(
        state: &mut AbstractState,
        bytes: &[u8],
        return_type: Option<&FieldType<BinaryName>>,
    ) -> Result<(), VerifierErrorKind> {
        let constants = fake_constants();
        let instruction = Instruction::decode(bytes, 0).unwrap();
        let context = MethodContext {
            constants: &constants,
            return_type,
        };
        apply_effect(state, &instruction, &context)
    }

    fn run(state: &mut AbstractState, bytes: &[u8]) -> Result<(), VerifierErrorKind> {
        run_with(state, bytes, None)
    }

    #[test]
    fn arithmetic() {
        let mut before = state(&[], &[Integer, Integer]);
        run(&mut before, &[0x60]).unwrap();
        assert_eq!(before.stack(), &[Integer]);

        let mut before = state(&[], &[LongHigh, LongLow, Integer]);
        run(&mut before, &[0x79]).unwrap();
        assert_eq!(before.stack(), &[LongHigh, LongLow]);
    }

    #[test]
    fn wrong_operand_type() {
        let mut before = state(&[], &[Integer, Float]);
        assert_eq!(
            run(&mut before, &[0x60]),
            Err(VerifierErrorKind::StackTypeMismatch {
                expected: String::from("I"),
                found: Float
            })
        );

        let mut before = state(&[], &[Integer, Integer]);
        assert_eq!(
            run(&mut before, &[0x61]),
            Err(VerifierErrorKind::StackTypeMismatch {
                expected: String::from("J"),
                found: Integer
            })
        );
    }

    #[test]
    fn underflow_and_overflow() {
        let mut before = state(&[], &[Integer]);
        assert_eq!(
            run(&mut before, &[0x60]),
            Err(VerifierErrorKind::StackUnderflow)
        );

        let mut before = state(&[], &[Integer, Integer, Integer, Integer, Integer]);
        assert_eq!(
            run(&mut before, &[0x09]),
            Err(VerifierErrorKind::StackOverflow { max_stack: 6 })
        );
    }

    #[test]
    fn unusable_values() {
        let mut before = state(&[], &[Top]);
        assert_eq!(
            run(&mut before, &[0x57]),
            Err(VerifierErrorKind::UnreachableValueUse)
        );
    }

    #[test]
    fn stack_shuffling() {
        let dog = reference("LDog;");

        let mut before = state(&[], &[Integer, dog.clone()]);
        run(&mut before, &[0x5a]).unwrap();
        assert_eq!(before.stack(), &[dog.clone(), Integer, dog.clone()]);

        let mut before = state(&[], &[Float, dog.clone()]);
        run(&mut before, &[0x5f]).unwrap();
        assert_eq!(before.stack(), &[dog, Float]);

        let mut before = state(&[], &[DoubleHigh, DoubleLow]);
        run(&mut before, &[0x5c]).unwrap();
        assert_eq!(before.stack(), &[DoubleHigh, DoubleLow, DoubleHigh, DoubleLow]);
    }

    #[test]
    fn split_pairs() {
        let mut before = state(&[], &[LongHigh, LongLow]);
        assert_eq!(
            run(&mut before, &[0x57]),
            Err(VerifierErrorKind::StackTypeMismatch {
                expected: String::from("J"),
                found: Empty
            })
        );

        let mut before = state(&[], &[DoubleHigh, DoubleLow, Integer]);
        assert_eq!(
            run(&mut before, &[0x5a]),
            Err(VerifierErrorKind::StackTypeMismatch {
                expected: String::from("D"),
                found: Integer
            })
        );

        let mut before = state(&[], &[LongHigh, LongLow]);
        run(&mut before, &[0x58]).unwrap();
        assert!(before.stack().is_empty());
    }

    #[test]
    fn array_components() {
        let mut before = state(&[], &[reference("[[I"), Integer]);
        run(&mut before, &[0x32]).unwrap();
        assert_eq!(before.stack(), &[reference("[I")]);

        let mut before = state(&[], &[Null, Integer]);
        run(&mut before, &[0x32]).unwrap();
        assert_eq!(before.stack(), &[Null]);

        let mut before = state(&[], &[reference("LDog;"), Integer]);
        assert_eq!(
            run(&mut before, &[0x32]),
            Err(VerifierErrorKind::StackTypeMismatch {
                expected: String::from("["),
                found: reference("LDog;")
            })
        );
    }

    #[test]
    fn loads() {
        let dog = reference("LDog;");
        let locals = [Integer, dog.clone(), LongHigh, LongLow, Uninitialized, Top];

        let mut before = state(&locals, &[]);
        run(&mut before, &[0x1a]).unwrap();
        run(&mut before, &[0x2b]).unwrap();
        run(&mut before, &[0x20]).unwrap();
        assert_eq!(before.stack(), &[Integer, dog, LongHigh, LongLow]);

        let mut before = state(&locals, &[]);
        assert_eq!(
            run(&mut before, &[0x15, 4]),
            Err(VerifierErrorKind::UninitializedRead { index: 4 })
        );
        assert_eq!(
            run(&mut before, &[0x15, 5]),
            Err(VerifierErrorKind::UnreachableValueUse)
        );
        assert_eq!(
            run(&mut before, &[0x17, 0]),
            Err(VerifierErrorKind::LocalTypeMismatch {
                index: 0,
                expected: LocalKind::Float,
                found: Integer
            })
        );
        assert_eq!(
            run(&mut before, &[0x16, 3]),
            Err(VerifierErrorKind::LocalTypeMismatch {
                index: 3,
                expected: LocalKind::Long,
                found: LongLow
            })
        );
        assert_eq!(
            run(&mut before, &[0x15, 6]),
            Err(VerifierErrorKind::LocalIndexOutOfRange {
                index: 6,
                max_locals: 6
            })
        );
        assert_eq!(
            run(&mut before, &[0x16, 5]),
            Err(VerifierErrorKind::LocalIndexOutOfRange {
                index: 5,
                max_locals: 6
            })
        );
    }

    #[test]
    fn stores() {
        let cat = reference("LCat;");

        let mut before = state(&[Uninitialized, Uninitialized, Null], &[DoubleHigh, DoubleLow]);
        run(&mut before, &[0x47]).unwrap();
        assert_eq!(before.locals(), &[DoubleHigh, DoubleLow, Null]);
        assert_eq!(before.stack_height, 0);

        let mut before = state(&[Uninitialized, Uninitialized, Null], &[cat.clone()]);
        run(&mut before, &[0x4d]).unwrap();
        assert_eq!(before.locals()[2], cat);

        let mut before = state(&[Integer], &[cat]);
        assert_eq!(
            run(&mut before, &[0x4b]),
            Err(VerifierErrorKind::LocalTypeMismatch {
                index: 0,
                expected: LocalKind::Reference,
                found: Integer
            })
        );

        let mut before = state(&[Integer], &[Float]);
        assert_eq!(
            run(&mut before, &[0x3b]),
            Err(VerifierErrorKind::StackTypeMismatch {
                expected: String::from("I"),
                found: Float
            })
        );

        let mut before = state(&[Integer], &[LongHigh, LongLow]);
        assert_eq!(
            run(&mut before, &[0x3f]),
            Err(VerifierErrorKind::LocalIndexOutOfRange {
                index: 0,
                max_locals: 1
            })
        );
    }

    #[test]
    fn increments() {
        let mut before = state(&[Integer, Float], &[]);
        run(&mut before, &[0x84, 0, 1]).unwrap();
        assert_eq!(before.locals(), &[Integer, Float]);
        assert_eq!(
            run(&mut before, &[0x84, 1, 1]),
            Err(VerifierErrorKind::LocalTypeMismatch {
                index: 1,
                expected: LocalKind::Int,
                found: Float
            })
        );
        let mut before = state(&[Uninitialized], &[]);
        assert_eq!(
            run(&mut before, &[0x84, 0, 1]),
            Err(VerifierErrorKind::UninitializedRead { index: 0 })
        );
    }

    #[test]
    fn returns() {
        let int = FieldType::int();
        let string = FieldType::object(BinaryName::STRING);

        let mut before = state(&[], &[Integer]);
        run_with(&mut before, &[0xac], Some(&int)).unwrap();
        assert!(before.stack().is_empty());

        let mut before = state(&[], &[Null]);
        run_with(&mut before, &[0xb0], Some(&string)).unwrap();

        let mut before = state(&[], &[Integer]);
        assert_eq!(
            run_with(&mut before, &[0xac], None),
            Err(VerifierErrorKind::ReturnTypeMismatch {
                declared: String::from("void"),
                mnemonic: "ireturn"
            })
        );
        assert_eq!(
            run_with(&mut before, &[0xb1], Some(&string)),
            Err(VerifierErrorKind::ReturnTypeMismatch {
                declared: String::from("Ljava/lang/String;"),
                mnemonic: "return"
            })
        );
    }

    #[test]
    fn symbolic_operands() {
        let mut before = state(&[], &[reference("LAnimal;"), Integer, LongHigh, LongLow, Null]);
        run(&mut before, &[0xb6, 0, 3]).unwrap();
        assert_eq!(before.stack(), &[reference("LDog;")]);

        run(&mut before, &[0xc1, 0, 5]).unwrap();
        assert_eq!(before.stack(), &[Integer]);

        let mut before = state(&[], &[Integer]);
        assert_eq!(
            run(&mut before, &[0xb4, 0, 2]),
            Err(VerifierErrorKind::StackTypeMismatch {
                expected: String::from("A"),
                found: Integer
            })
        );
    }

    #[test]
    fn no_constant_pool() {
        let instruction = Instruction::decode(&[0xbb, 0, 1], 0).unwrap();
        let context = MethodContext {
            constants: &NoConstants,
            return_type: None,
        };
        let mut before = state(&[], &[]);
        assert!(matches!(
            apply_effect(&mut before, &instruction, &context),
            Err(VerifierErrorKind::UnresolvableOperand { index: 1, .. })
        ));
    }

    #[test]
    fn subroutines() {
        let mut before = state(&[], &[]);
        assert_eq!(
            run(&mut before, &[0xa8, 0, 3]),
            Err(VerifierErrorKind::UnsupportedOpcode("jsr"))
        );
        let mut before = state(&[Integer], &[]);
        assert_eq!(
            run(&mut before, &[0xa9, 0]),
            Err(VerifierErrorKind::UnsupportedOpcode("ret"))
        );
    }
}

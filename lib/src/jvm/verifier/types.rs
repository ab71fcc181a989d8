use crate::jvm::class_graph::LeastUpperBound;
use crate::jvm::{BaseType, BinaryName, FieldType, RefType, RenderDescriptor};
use std::fmt;

/// Type of a single local variable or stack slot
///
/// These are loosely based on [this hierarchy][0], except that `long` and `double` take up two
/// slots (a high half always directly followed by a low half) and there are extra sentinels for
/// slots that are never assigned (`Uninitialized`), unusable (`Top`), or above the top of the
/// stack (`Empty`).
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.10.1.2
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum VerificationType {
    Integer,
    Float,
    LongHigh,
    LongLow,
    DoubleHigh,
    DoubleLow,

    /// Object or array type
    Reference(RefType<BinaryName>),

    /// Known to be `null`, so it fits in any reference type
    Null,

    /// Local which has not been assigned on some path
    Uninitialized,

    /// Slot with no usable value
    Top,

    /// Stack slot which is not currently occupied
    Empty,
}

impl VerificationType {
    /// Primitive values, including either half of a two-slot value
    pub fn is_simple(&self) -> bool {
        matches!(
            self,
            VerificationType::Integer
                | VerificationType::Float
                | VerificationType::LongHigh
                | VerificationType::LongLow
                | VerificationType::DoubleHigh
                | VerificationType::DoubleLow
        )
    }

    /// Reference types, including `null`
    pub fn is_reference(&self) -> bool {
        matches!(self, VerificationType::Reference(_) | VerificationType::Null)
    }

    /// Slots used to hold a value of the given field type
    ///
    /// Sub-`int` types all get widened to `int`.
    pub fn from_field_type(field_type: &FieldType<BinaryName>) -> Vec<VerificationType> {
        match field_type {
            FieldType::Base(
                BaseType::Int
                | BaseType::Char
                | BaseType::Short
                | BaseType::Byte
                | BaseType::Boolean,
            ) => vec![VerificationType::Integer],
            FieldType::Base(BaseType::Float) => vec![VerificationType::Float],
            FieldType::Base(BaseType::Long) => {
                vec![VerificationType::LongHigh, VerificationType::LongLow]
            }
            FieldType::Base(BaseType::Double) => {
                vec![VerificationType::DoubleHigh, VerificationType::DoubleLow]
            }
            FieldType::Ref(ref_type) => vec![VerificationType::Reference(ref_type.clone())],
        }
    }
}

impl fmt::Display for VerificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationType::Integer => f.write_str("int"),
            VerificationType::Float => f.write_str("float"),
            VerificationType::LongHigh => f.write_str("long"),
            VerificationType::LongLow => f.write_str("long(low)"),
            VerificationType::DoubleHigh => f.write_str("double"),
            VerificationType::DoubleLow => f.write_str("double(low)"),
            VerificationType::Reference(ref_type) => f.write_str(&ref_type.render()),
            VerificationType::Null => f.write_str("null"),
            VerificationType::Uninitialized => f.write_str("uninitialized"),
            VerificationType::Top => f.write_str("top"),
            VerificationType::Empty => f.write_str("empty"),
        }
    }
}

/// Two types meeting at a merge point which cannot be reconciled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncompatibleTypes {
    pub existing: VerificationType,
    pub incoming: VerificationType,
}

/// Join an incoming type into an existing one
///
/// Returns the joined type along with whether it differs from the existing type (in which case
/// whatever depends on the existing type needs to be recomputed). The joined type itself does not
/// depend on the order of the arguments.
pub fn join(
    existing: &VerificationType,
    incoming: &VerificationType,
    lub: &dyn LeastUpperBound,
) -> Result<(VerificationType, bool), IncompatibleTypes> {
    use VerificationType::*;

    let incompatible = || IncompatibleTypes {
        existing: existing.clone(),
        incoming: incoming.clone(),
    };

    match (existing, incoming) {
        _ if existing == incoming => Ok((existing.clone(), false)),
        (Top, _) | (_, Top) => Err(incompatible()),
        (Uninitialized, _) => Ok((Uninitialized, false)),
        (_, Uninitialized) => Ok((Uninitialized, true)),
        (Empty, _) | (_, Empty) => Err(incompatible()),
        (Null, Null) => Ok((Null, false)),
        (Reference(_), Null) => Ok((existing.clone(), false)),
        (Null, Reference(_)) => Ok((incoming.clone(), true)),
        (Reference(ref1), Reference(ref2)) => {
            let joined = lub.least_upper_bound(ref1, ref2);
            let changed = &joined != ref1;
            Ok((Reference(joined), changed))
        }

        // Distinct primitives
        (
            Integer | Float | LongHigh | LongLow | DoubleHigh | DoubleLow,
            Integer | Float | LongHigh | LongLow | DoubleHigh | DoubleLow,
        ) => Err(incompatible()),

        // Primitive against a reference
        (
            Integer | Float | LongHigh | LongLow | DoubleHigh | DoubleLow,
            Reference(_) | Null,
        )
        | (
            Reference(_) | Null,
            Integer | Float | LongHigh | LongLow | DoubleHigh | DoubleLow,
        ) => Err(incompatible()),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_graph::{ClassGraph, ClassGraphArenas, DeclaredClass};
    use crate::jvm::{Name, ParseDescriptor};
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

    fn all_types() -> Vec<VerificationType> {
        vec![
            Integer,
            Float,
            LongHigh,
            LongLow,
            DoubleHigh,
            DoubleLow,
            reference("LDog;"),
            reference("LCat;"),
            reference("LAnimal;"),
            reference("[I"),
            Null,
            Uninitialized,
            Top,
            Empty,
        ]
    }

    #[test]
    fn equal_types_are_unchanged() {
        with_animals(|graph| {
            for typ in all_types() {
                assert_eq!(join(&typ, &typ, graph), Ok((typ.clone(), false)), "{}", typ);
            }
        })
    }

    #[test]
    fn top_never_joins() {
        with_animals(|graph| {
            for typ in all_types() {
                if typ != Top {
                    assert!(join(&Top, &typ, graph).is_err(), "top and {}", typ);
                    assert!(join(&typ, &Top, graph).is_err(), "{} and top", typ);
                }
            }
        })
    }

    #[test]
    fn uninitialized_absorbs() {
        with_animals(|graph| {
            assert_eq!(join(&Integer, &Uninitialized, graph), Ok((Uninitialized, true)));
            assert_eq!(join(&Uninitialized, &Integer, graph), Ok((Uninitialized, false)));
            assert_eq!(
                join(&reference("LDog;"), &Uninitialized, graph),
                Ok((Uninitialized, true))
            );
            assert_eq!(join(&Uninitialized, &Null, graph), Ok((Uninitialized, false)));
        })
    }

    #[test]
    fn simple_types() {
        with_animals(|graph| {
            assert_eq!(
                join(&Integer, &Float, graph),
                Err(IncompatibleTypes {
                    existing: Integer,
                    incoming: Float
                })
            );
            assert!(join(&LongHigh, &DoubleHigh, graph).is_err());
            assert!(join(&Integer, &reference("LDog;"), graph).is_err());
            assert!(join(&Null, &Float, graph).is_err());
            assert!(join(&Empty, &Integer, graph).is_err());
        })
    }

    #[test]
    fn primitives_never_meet_references() {
        with_animals(|graph| {
            for a in all_types() {
                for b in all_types() {
                    if a.is_simple() && (b.is_reference() || (b.is_simple() && a != b)) {
                        assert!(join(&a, &b, graph).is_err(), "{} and {}", a, b);
                        assert!(join(&b, &a, graph).is_err(), "{} and {}", b, a);
                    }
                }
            }
            assert!(!Empty.is_simple() && !Empty.is_reference());
            assert!(!Uninitialized.is_simple() && !Top.is_reference());
        })
    }

    #[test]
    fn null_and_references() {
        with_animals(|graph| {
            let dog = reference("LDog;");
            assert_eq!(join(&dog, &Null, graph), Ok((dog.clone(), false)));
            assert_eq!(join(&Null, &dog, graph), Ok((dog.clone(), true)));
        })
    }

    #[test]
    fn references_use_least_upper_bound() {
        with_animals(|graph| {
            let animal = reference("LAnimal;");
            assert_eq!(
                join(&reference("LDog;"), &reference("LCat;"), graph),
                Ok((animal.clone(), true))
            );
            assert_eq!(
                join(&animal, &reference("LCat;"), graph),
                Ok((animal.clone(), false))
            );
            assert_eq!(
                join(&reference("[I"), &reference("LDog;"), graph),
                Ok((Reference(RefType::Object(BinaryName::OBJECT)), true))
            );
        })
    }

    #[test]
    fn commutative_and_associative() {
        with_animals(|graph| {
            let types = all_types();
            let joined = |a: &VerificationType, b: &VerificationType| {
                join(a, b, graph).ok().map(|(typ, _)| typ)
            };
            for a in &types {
                for b in &types {
                    assert_eq!(joined(a, b), joined(b, a), "{} and {}", a, b);
                    for c in &types {
                        let left = joined(a, b).and_then(|ab| joined(&ab, c));
                        let right = joined(b, c).and_then(|bc| joined(a, &bc));
                        if let (Some(left), Some(right)) = (left, right) {
                            assert_eq!(left, right, "{}, {}, and {}", a, b, c);
                        }
                    }
                }
            }
        })
    }

    #[test]
    fn field_type_slots() {
        let string = FieldType::object(BinaryName::STRING);
        assert_eq!(
            VerificationType::from_field_type(&string),
            vec![Reference(RefType::Object(BinaryName::STRING))]
        );
        assert_eq!(
            VerificationType::from_field_type(&FieldType::Base(BaseType::Boolean)),
            vec![Integer]
        );
        assert_eq!(
            VerificationType::from_field_type(&FieldType::double()),
            vec![DoubleHigh, DoubleLow]
        );
        assert_eq!(
            reference("Ljava/lang/String;").to_string(),
            format!("L{};", BinaryName::STRING.as_str())
        );
    }
}

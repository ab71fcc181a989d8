use super::{Instruction, VerifierErrorKind};
use crate::jvm::opcodes::SymbolicOperand;
use crate::jvm::{BaseType, BinaryName, FieldType, MethodDescriptor, RefType, RenderDescriptor};
use crate::util::Width;

/// Source of the types behind constant pool operands
///
/// Errors are free-form explanations, and end up in [`VerifierErrorKind::UnresolvableOperand`].
pub trait ConstantResolver {
    /// Type of the field referenced by a `CONSTANT_Fieldref`
    fn field_type(&self, index: u16) -> Result<FieldType<BinaryName>, String>;

    /// Descriptor of the method referenced by a `CONSTANT_Methodref`,
    /// `CONSTANT_InterfaceMethodref`, or `CONSTANT_InvokeDynamic`
    fn method_descriptor(&self, index: u16) -> Result<MethodDescriptor<BinaryName>, String>;

    /// Type named by a `CONSTANT_Class`
    fn class_type(&self, index: u16) -> Result<RefType<BinaryName>, String>;

    /// Type of the value pushed when loading a constant
    fn loadable_type(&self, index: u16) -> Result<FieldType<BinaryName>, String>;
}

/// Resolver for code which is not allowed to reference the constant pool
#[derive(Debug, Clone, Copy, Default)]
pub struct NoConstants;

impl ConstantResolver for NoConstants {
    fn field_type(&self, _index: u16) -> Result<FieldType<BinaryName>, String> {
        Err(String::from("no constant pool"))
    }

    fn method_descriptor(&self, _index: u16) -> Result<MethodDescriptor<BinaryName>, String> {
        Err(String::from("no constant pool"))
    }

    fn class_type(&self, _index: u16) -> Result<RefType<BinaryName>, String> {
        Err(String::from("no constant pool"))
    }

    fn loadable_type(&self, _index: u16) -> Result<FieldType<BinaryName>, String> {
        Err(String::from("no constant pool"))
    }
}

/// Render the stack effect of an instruction with a symbolic operand
pub fn symbolic_signature(
    symbolic: SymbolicOperand,
    instruction: &Instruction,
    constants: &dyn ConstantResolver,
) -> Result<String, VerifierErrorKind> {
    let index = match symbolic {
        SymbolicOperand::LoadConstant | SymbolicOperand::NewArray => {
            instruction.u8_operand(0) as u16
        }
        _ => instruction.u16_operand(0),
    };
    let unresolvable = |reason: String| VerifierErrorKind::UnresolvableOperand { index, reason };

    let mut signature = String::new();
    match symbolic {
        SymbolicOperand::LoadConstant | SymbolicOperand::LoadConstantWideIndex => {
            let typ = constants.loadable_type(index).map_err(unresolvable)?;
            if typ.width() != 1 {
                let msg = format!("{} cannot load {}", instruction.mnemonic(), typ.render());
                return Err(unresolvable(msg));
            }
            signature.push('>');
            typ.render_to(&mut signature);
        }
        SymbolicOperand::LoadLongOrDouble => {
            let typ = constants.loadable_type(index).map_err(unresolvable)?;
            if typ.width() != 2 {
                let msg = format!("ldc2_w cannot load {}", typ.render());
                return Err(unresolvable(msg));
            }
            signature.push('>');
            typ.render_to(&mut signature);
        }

        SymbolicOperand::GetStatic => {
            let typ = constants.field_type(index).map_err(unresolvable)?;
            signature.push('>');
            typ.render_to(&mut signature);
        }
        SymbolicOperand::PutStatic => {
            let typ = constants.field_type(index).map_err(unresolvable)?;
            typ.render_to(&mut signature);
            signature.push('>');
        }
        SymbolicOperand::GetField => {
            let typ = constants.field_type(index).map_err(unresolvable)?;
            signature.push_str("A>");
            typ.render_to(&mut signature);
        }
        SymbolicOperand::PutField => {
            let typ = constants.field_type(index).map_err(unresolvable)?;
            signature.push('A');
            typ.render_to(&mut signature);
            signature.push('>');
        }

        SymbolicOperand::InvokeVirtual
        | SymbolicOperand::InvokeSpecial
        | SymbolicOperand::InvokeInterface
        | SymbolicOperand::InvokeStatic
        | SymbolicOperand::InvokeDynamic => {
            let descriptor = constants.method_descriptor(index).map_err(unresolvable)?;
            let has_receiver = !matches!(
                symbolic,
                SymbolicOperand::InvokeStatic | SymbolicOperand::InvokeDynamic
            );
            if has_receiver {
                signature.push('A');
            }
            for parameter in &descriptor.parameters {
                parameter.render_to(&mut signature);
            }
            signature.push('>');
            if let Some(return_type) = &descriptor.return_type {
                return_type.render_to(&mut signature);
            }
        }

        SymbolicOperand::New => {
            let class = constants.class_type(index).map_err(unresolvable)?;
            if !matches!(class, RefType::Object(_)) {
                let msg = format!("new cannot allocate {}", class.render());
                return Err(unresolvable(msg));
            }
            signature.push('>');
            class.render_to(&mut signature);
        }
        SymbolicOperand::NewArray => {
            let element = BaseType::from_array_type_code(index as u8)
                .ok_or_else(|| unresolvable(String::from("invalid array type code")))?;
            signature.push_str("I>[");
            element.render_to(&mut signature);
        }
        SymbolicOperand::ANewArray => {
            let class = constants.class_type(index).map_err(unresolvable)?;
            signature.push_str("I>");
            RefType::array(FieldType::Ref(class)).render_to(&mut signature);
        }
        SymbolicOperand::CheckCast => {
            let class = constants.class_type(index).map_err(unresolvable)?;
            signature.push_str("A>");
            class.render_to(&mut signature);
        }
        SymbolicOperand::InstanceOf => {
            constants.class_type(index).map_err(unresolvable)?;
            signature.push_str("A>I");
        }
        SymbolicOperand::MultiANewArray => {
            let class = constants.class_type(index).map_err(unresolvable)?;
            let dimensions = instruction.u8_operand(2) as usize;
            let array_dimensions = match &class {
                RefType::Object(_) => 0,
                RefType::PrimitiveArray(arr) => arr.dimensions(),
                RefType::ObjectArray(arr) => arr.dimensions(),
            };
            if dimensions == 0 || dimensions > array_dimensions {
                let msg = format!("cannot allocate {} dimensions of {}", dimensions, class.render());
                return Err(unresolvable(msg));
            }
            for _ in 0..dimensions {
                signature.push('I');
            }
            signature.push('>');
            class.render_to(&mut signature);
        }
    }

    Ok(signature)
}

/// Stack effect of the return instruction matching a return type
pub fn return_signature(return_type: Option<&FieldType<BinaryName>>) -> &'static str {
    match return_type {
        None => "",
        Some(FieldType::Base(BaseType::Long)) => "J>",
        Some(FieldType::Base(BaseType::Float)) => "F>",
        Some(FieldType::Base(BaseType::Double)) => "D>",
        Some(FieldType::Base(_)) => "I>",
        Some(FieldType::Ref(_)) => "A>",
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::jvm::ParseDescriptor;
    use std::collections::HashMap;

    /// Constant pool stand-in, with every kind of entry keyed by its index
    #[derive(Default)]
    pub struct FakeConstants {
        pub fields: HashMap<u16, &'static str>,
        pub methods: HashMap<u16, &'static str>,
        pub classes: HashMap<u16, &'static str>,
        pub loadables: HashMap<u16, &'static str>,
    }

    fn lookup<D: ParseDescriptor>(
        entries: &HashMap<u16, &'static str>,
        index: u16,
    ) -> Result<D, String> {
        let descriptor = entries
            .get(&index)
            .ok_or_else(|| format!("no entry #{}", index))?;
        D::parse(descriptor).map_err(|err| err.to_string())
    }

    impl ConstantResolver for FakeConstants {
        fn field_type(&self, index: u16) -> Result<FieldType<BinaryName>, String> {
            lookup(&self.fields, index)
        }

        fn method_descriptor(&self, index: u16) -> Result<MethodDescriptor<BinaryName>, String> {
            lookup(&self.methods, index)
        }

        fn class_type(&self, index: u16) -> Result<RefType<BinaryName>, String> {
            let name = self
                .classes
                .get(&index)
                .ok_or_else(|| format!("no entry #{}", index))?;
            RefType::from_class_name(name).map_err(|err| err.to_string())
        }

        fn loadable_type(&self, index: u16) -> Result<FieldType<BinaryName>, String> {
            lookup(&self.loadables, index)
        }
    }

    pub fn fake_constants() -> FakeConstants {
        let mut constants = FakeConstants::default();
        constants.fields.insert(1, "I");
        constants.fields.insert(2, "LAnimal;");
        constants.methods.insert(3, "(IJLjava/lang/String;)LDog;");
        constants.methods.insert(4, "()V");
        constants.classes.insert(5, "Dog");
        constants.classes.insert(6, "[[Ljava/lang/String;");
        constants.loadables.insert(7, "Ljava/lang/String;");
        constants.loadables.insert(8, "J");
        constants
    }

    fn signature_of(bytes: &[u8]) -> Result<String, VerifierErrorKind> {
        let instruction = Instruction::decode(bytes, 0).unwrap();
        let symbolic = instruction.description.symbolic.unwrap();
        symbolic_signature(symbolic, &instruction, &fake_constants())
    }

    #[test]
    fn field_accesses() {
        assert_eq!(signature_of(&[0xb2, 0, 1]).unwrap(), ">I");
        assert_eq!(signature_of(&[0xb3, 0, 2]).unwrap(), "LAnimal;>");
        assert_eq!(signature_of(&[0xb4, 0, 2]).unwrap(), "A>LAnimal;");
        assert_eq!(signature_of(&[0xb5, 0, 1]).unwrap(), "AI>");
    }

    #[test]
    fn invocations() {
        assert_eq!(
            signature_of(&[0xb6, 0, 3]).unwrap(),
            "AIJLjava/lang/String;>LDog;"
        );
        assert_eq!(signature_of(&[0xb8, 0, 4]).unwrap(), ">");
        assert_eq!(signature_of(&[0xb9, 0, 4, 1, 0]).unwrap(), "A>");
        assert_eq!(signature_of(&[0xba, 0, 3, 0, 0]).unwrap(), "IJLjava/lang/String;>LDog;");
    }

    #[test]
    fn constants() {
        assert_eq!(signature_of(&[0x12, 7]).unwrap(), ">Ljava/lang/String;");
        assert_eq!(signature_of(&[0x14, 0, 8]).unwrap(), ">J");
        assert!(matches!(
            signature_of(&[0x13, 0, 8]),
            Err(VerifierErrorKind::UnresolvableOperand { index: 8, .. })
        ));
        assert!(matches!(
            signature_of(&[0x14, 0, 7]),
            Err(VerifierErrorKind::UnresolvableOperand { index: 7, .. })
        ));
        assert!(matches!(
            signature_of(&[0x12, 9]),
            Err(VerifierErrorKind::UnresolvableOperand { index: 9, .. })
        ));
    }

    #[test]
    fn allocations() {
        assert_eq!(signature_of(&[0xbb, 0, 5]).unwrap(), ">LDog;");
        assert!(signature_of(&[0xbb, 0, 6]).is_err());
        assert_eq!(signature_of(&[0xbc, 10]).unwrap(), "I>[I");
        assert!(signature_of(&[0xbc, 3]).is_err());
        assert_eq!(signature_of(&[0xbd, 0, 5]).unwrap(), "I>[LDog;");
        assert_eq!(signature_of(&[0xbd, 0, 6]).unwrap(), "I>[[[Ljava/lang/String;");
        assert_eq!(
            signature_of(&[0xc5, 0, 6, 2]).unwrap(),
            "II>[[Ljava/lang/String;"
        );
        assert!(signature_of(&[0xc5, 0, 6, 3]).is_err());
        assert!(signature_of(&[0xc5, 0, 6, 0]).is_err());
        assert!(signature_of(&[0xc5, 0, 5, 1]).is_err());
    }

    #[test]
    fn type_checks() {
        assert_eq!(signature_of(&[0xc0, 0, 5]).unwrap(), "A>LDog;");
        assert_eq!(signature_of(&[0xc1, 0, 6]).unwrap(), "A>I");
        assert!(signature_of(&[0xc1, 0, 1]).is_err());
    }

    #[test]
    fn return_signatures() {
        assert_eq!(return_signature(None), "");
        assert_eq!(return_signature(Some(&FieldType::Base(BaseType::Boolean))), "I>");
        assert_eq!(return_signature(Some(&FieldType::double())), "D>");
        assert_eq!(return_signature(Some(&FieldType::object(BinaryName::STRING))), "A>");
    }
}

use super::{
    apply_effect, decode_all, initial_state, merge, successors, ConstantResolver, MethodContext,
    StateStore, VerifierError, VerifierErrorKind, VerifierSettings,
};
use crate::jvm::class_graph::LeastUpperBound;
use crate::jvm::{
    BinaryName, ClassFile, Error, MethodAccessFlags, MethodDescriptor, ParseDescriptor,
    UnqualifiedName,
};

/// Everything about a method body that the verifier looks at (besides the constant pool)
#[derive(Debug, Clone, Copy)]
pub struct MethodBody<'a> {
    /// Class of the receiver (`None` for static methods)
    pub this_class: Option<&'a BinaryName>,
    pub descriptor: &'a MethodDescriptor<BinaryName>,
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: &'a [u8],
}

/// Run the dataflow analysis of a method body to a fixed point
///
/// On success, the returned store has the (converged) state before every reachable
/// instruction. The first problem found stops the analysis.
pub fn verify_method(
    body: &MethodBody,
    constants: &dyn ConstantResolver,
    lub: &dyn LeastUpperBound,
    settings: &VerifierSettings,
) -> Result<StateStore, VerifierError> {
    let instructions = decode_all(body.code)?;
    if instructions.is_empty() {
        return Err(VerifierErrorKind::FallsOffCode.at(0));
    }

    let context = MethodContext {
        constants,
        return_type: body.descriptor.return_type.as_ref(),
    };
    let entry = initial_state(
        body.this_class,
        body.descriptor,
        body.max_locals,
        body.max_stack,
    )
    .map_err(|kind| kind.at(0))?;

    let mut store = StateStore::new();
    store.insert(entry);
    log::debug!(
        "Seeded {} instructions (max stack {}, max locals {})",
        instructions.len(),
        body.max_stack,
        body.max_locals
    );

    let mut iterations = 0;
    while let Some(state) = store.next_dirty() {
        state.dirty = false;
        iterations += 1;
        if settings.trace_states {
            log::info!("{}", state);
        }

        let position = state.position;
        let mut after = state.clone();
        let instruction = instructions
            .get(&position)
            .ok_or_else(|| VerifierErrorKind::InvalidBranchTarget(position as i64).at(position))?;

        apply_effect(&mut after, instruction, &context).map_err(|kind| kind.at(position))?;
        log::trace!("{} {} -> {}", position, instruction.mnemonic(), after);

        let targets = successors(instruction, &instructions).map_err(|kind| kind.at(position))?;
        for target in targets {
            match store.get_mut(target) {
                Some(existing) => {
                    let widened = merge(existing, after.stack_height, &after.slots, lub)
                        .map_err(|kind| kind.at(target))?;
                    if widened {
                        log::trace!("Widened state at {}", target);
                    }
                }
                None => store.insert(after.moved_to(target)),
            }
        }
    }

    log::debug!(
        "Converged after {} iterations over {} states",
        iterations,
        store.len()
    );
    Ok(store)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodOutcome {
    Accepted,

    /// Abstract and native methods have no code to verify
    Skipped,

    Rejected(VerifierError),
}

#[derive(Debug, Clone)]
pub struct MethodVerdict {
    pub name: UnqualifiedName,

    /// Descriptor as written in the class file
    pub descriptor: String,
    pub outcome: MethodOutcome,
}

/// Outcome of verifying every method of a class
#[derive(Debug, Clone)]
pub struct ClassVerdict {
    pub class: BinaryName,
    pub methods: Vec<MethodVerdict>,
}

impl ClassVerdict {
    pub fn is_accepted(&self) -> bool {
        self.rejections().next().is_none()
    }

    /// Rejected methods, along with why they were rejected
    pub fn rejections(&self) -> impl Iterator<Item = (&MethodVerdict, &VerifierError)> {
        self.methods.iter().filter_map(|method| match &method.outcome {
            MethodOutcome::Rejected(err) => Some((method, err)),
            MethodOutcome::Accepted | MethodOutcome::Skipped => None,
        })
    }
}

/// Verify every method of a class
///
/// Methods are verified independently: one rejected method doesn't stop the others from being
/// verified, even when its `Code` attribute can't be decoded. The only errors returned here are
/// problems reading the class itself or the names of its methods.
pub fn verify_class(
    class_file: &ClassFile,
    lub: &dyn LeastUpperBound,
    settings: &VerifierSettings,
) -> Result<ClassVerdict, Error> {
    let class = class_file.class_name()?;
    let constants = &class_file.constants;
    let mut methods = Vec::with_capacity(class_file.methods.len());

    for method in &class_file.methods {
        let name = method.name(constants)?;
        let descriptor = constants.utf8(method.descriptor_index)?.to_owned();
        log::debug!("Verifying {}.{}{}", class, name, descriptor);

        let outcome = if method.access_flags.has_no_code() {
            MethodOutcome::Skipped
        } else {
            let is_static = method.access_flags.contains(MethodAccessFlags::STATIC);
            let parsed = MethodDescriptor::parse(&descriptor)
                .map_err(|err| VerifierErrorKind::BadDescriptor(err.to_string()).at(0));
            let code = method
                .code(constants)
                .map_err(|err| VerifierErrorKind::MalformedCode(err.to_string()).at(0));
            let verified = match (parsed, code) {
                (Err(err), _) | (_, Err(err)) => Err(err),
                (Ok(_), Ok(None)) => Err(VerifierErrorKind::FallsOffCode.at(0)),
                (Ok(parsed), Ok(Some(code))) => {
                    let body = MethodBody {
                        this_class: if is_static { None } else { Some(&class) },
                        descriptor: &parsed,
                        max_stack: code.max_stack,
                        max_locals: code.max_locals,
                        code: &code.code_array.0,
                    };
                    verify_method(&body, constants, lub, settings).map(|_| ())
                }
            };
            match verified {
                Ok(()) => MethodOutcome::Accepted,
                Err(err) => {
                    log::debug!("Rejected {}.{}{} {}", class, name, descriptor, err);
                    MethodOutcome::Rejected(err)
                }
            }
        };

        methods.push(MethodVerdict {
            name,
            descriptor,
            outcome,
        });
    }

    Ok(ClassVerdict { class, methods })
}

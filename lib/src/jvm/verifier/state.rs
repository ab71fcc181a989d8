use super::{VerificationType, VerifierErrorKind};
use crate::jvm::{BinaryName, MethodDescriptor, RefType};
use std::collections::HashMap;
use std::fmt;

/// What the verifier knows about the locals and the operand stack at one bytecode position
///
/// Locals and stack share one array of `max_locals + max_stack` slots: locals come first and the
/// stack grows upwards after them. Stack slots at or above the current height are `Empty`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbstractState {
    /// Offset of the instruction in the code array
    pub position: u32,
    pub slots: Vec<VerificationType>,
    pub max_locals: u16,
    pub stack_height: u16,

    /// Set when the state has changed since its successors were last computed
    pub dirty: bool,
}

impl AbstractState {
    /// State with every local uninitialized and an empty stack
    pub fn new(position: u32, max_locals: u16, max_stack: u16) -> AbstractState {
        let mut slots = vec![VerificationType::Uninitialized; max_locals as usize];
        slots.resize(max_locals as usize + max_stack as usize, VerificationType::Empty);
        AbstractState {
            position,
            slots,
            max_locals,
            stack_height: 0,
            dirty: true,
        }
    }

    /// Copy of the state, to be placed at a different position
    pub fn moved_to(&self, position: u32) -> AbstractState {
        AbstractState {
            position,
            dirty: true,
            ..self.clone()
        }
    }

    pub fn max_stack(&self) -> u16 {
        (self.slots.len() - self.max_locals as usize) as u16
    }

    pub fn locals(&self) -> &[VerificationType] {
        &self.slots[..self.max_locals as usize]
    }

    /// Occupied part of the operand stack (bottom first)
    pub fn stack(&self) -> &[VerificationType] {
        let start = self.max_locals as usize;
        &self.slots[start..start + self.stack_height as usize]
    }

    pub fn local(&self, index: u16) -> Option<&VerificationType> {
        self.locals().get(index as usize)
    }

    /// Overwrite a local (the index must be in range)
    pub fn set_local(&mut self, index: u16, value: VerificationType) {
        self.slots[index as usize] = value;
    }

    pub fn push(&mut self, value: VerificationType) -> Result<(), VerifierErrorKind> {
        if self.stack_height >= self.max_stack() {
            return Err(VerifierErrorKind::StackOverflow {
                max_stack: self.max_stack(),
            });
        }
        let slot = self.max_locals as usize + self.stack_height as usize;
        self.slots[slot] = value;
        self.stack_height += 1;
        Ok(())
    }

    /// Pop the top stack slot, leaving it `Empty`
    pub fn pop(&mut self) -> Result<VerificationType, VerifierErrorKind> {
        if self.stack_height == 0 {
            return Err(VerifierErrorKind::StackUnderflow);
        }
        let slot = self.max_locals as usize + self.stack_height as usize - 1;
        let value = std::mem::replace(&mut self.slots[slot], VerificationType::Empty);
        if value == VerificationType::Empty {
            return Err(VerifierErrorKind::StackUnderflow);
        }
        self.stack_height -= 1;
        Ok(value)
    }

    /// Top of the stack (`None` if the stack is empty)
    pub fn peek(&self) -> Option<&VerificationType> {
        self.stack().last()
    }
}

/// Locals as `V<i>`, stack as `S<i>`
impl fmt::Display for AbstractState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.position)?;
        for (index, local) in self.locals().iter().enumerate() {
            write!(f, " V{}={}", index, local)?;
        }
        for (index, value) in self.stack().iter().enumerate() {
            write!(f, " S{}={}", index, value)?;
        }
        Ok(())
    }
}

/// State at the method entry, with parameters in the first locals
///
/// `this_class` is `None` for static methods. Otherwise, the receiver goes in local 0.
pub fn initial_state(
    this_class: Option<&BinaryName>,
    descriptor: &MethodDescriptor<BinaryName>,
    max_locals: u16,
    max_stack: u16,
) -> Result<AbstractState, VerifierErrorKind> {
    let parameter_length = descriptor.parameter_length(this_class.is_some());
    if parameter_length > max_locals as usize {
        return Err(VerifierErrorKind::LocalIndexOutOfRange {
            index: (parameter_length - 1) as u16,
            max_locals,
        });
    }

    let mut state = AbstractState::new(0, max_locals, max_stack);
    let mut next_local: u16 = 0;
    if let Some(this_class) = this_class {
        let this_type = RefType::Object(this_class.clone());
        state.set_local(next_local, VerificationType::Reference(this_type));
        next_local += 1;
    }
    for parameter in &descriptor.parameters {
        for slot in VerificationType::from_field_type(parameter) {
            state.set_local(next_local, slot);
            next_local += 1;
        }
    }
    Ok(state)
}

/// Work-list of abstract states, keyed by position
///
/// States are kept in the order they were discovered, which is also the order in which dirty
/// states are handed out.
#[derive(Debug, Default)]
pub struct StateStore {
    states: Vec<AbstractState>,
    by_position: HashMap<u32, usize>,
}

impl StateStore {
    pub fn new() -> StateStore {
        StateStore::default()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn get(&self, position: u32) -> Option<&AbstractState> {
        self.by_position
            .get(&position)
            .map(|index| &self.states[*index])
    }

    pub fn get_mut(&mut self, position: u32) -> Option<&mut AbstractState> {
        match self.by_position.get(&position) {
            Some(index) => Some(&mut self.states[*index]),
            None => None,
        }
    }

    /// Add the state for a position seen for the first time (it is marked dirty)
    ///
    /// If the position already had a state, that state gets replaced.
    pub fn insert(&mut self, mut state: AbstractState) {
        state.dirty = true;
        match self.by_position.get(&state.position) {
            Some(index) => self.states[*index] = state,
            None => {
                self.by_position.insert(state.position, self.states.len());
                self.states.push(state);
            }
        }
    }

    /// Earliest discovered state which is still dirty
    pub fn next_dirty(&mut self) -> Option<&mut AbstractState> {
        self.states.iter_mut().find(|state| state.dirty)
    }

    /// States in discovery order
    pub fn iter(&self) -> impl Iterator<Item = &AbstractState> {
        self.states.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{FieldType, ParseDescriptor};
    use VerificationType::*;

    #[test]
    fn push_and_pop() {
        let mut state = AbstractState::new(0, 1, 2);
        assert_eq!(state.max_stack(), 2);
        assert_eq!(state.pop(), Err(VerifierErrorKind::StackUnderflow));

        state.push(Integer).unwrap();
        state.push(Float).unwrap();
        assert_eq!(
            state.push(Integer),
            Err(VerifierErrorKind::StackOverflow { max_stack: 2 })
        );
        assert_eq!(state.stack(), &[Integer, Float]);
        assert_eq!(state.peek(), Some(&Float));

        assert_eq!(state.pop(), Ok(Float));
        assert_eq!(state.stack_height, 1);
        assert_eq!(state.slots, vec![Uninitialized, Integer, Empty]);
    }

    #[test]
    fn static_method_entry() {
        let descriptor = MethodDescriptor::parse("(JLjava/lang/String;I)V").unwrap();
        let state = initial_state(None, &descriptor, 5, 1).unwrap();
        assert_eq!(state.position, 0);
        assert!(state.dirty);
        assert_eq!(
            state.locals(),
            &[
                LongHigh,
                LongLow,
                Reference(RefType::Object(BinaryName::STRING)),
                Integer,
                Uninitialized
            ]
        );
        assert_eq!(state.stack_height, 0);
        assert_eq!(state.slots[5], Empty);
    }

    #[test]
    fn instance_method_entry() {
        let descriptor = MethodDescriptor {
            parameters: vec![FieldType::double()],
            return_type: None,
        };
        let state = initial_state(Some(&BinaryName::STRING), &descriptor, 3, 0).unwrap();
        assert_eq!(
            state.locals(),
            &[
                Reference(RefType::Object(BinaryName::STRING)),
                DoubleHigh,
                DoubleLow
            ]
        );
        assert_eq!(
            state.to_string(),
            "@0 V0=Ljava/lang/String; V1=double V2=double(low)"
        );

        assert_eq!(
            initial_state(Some(&BinaryName::STRING), &descriptor, 2, 0),
            Err(VerifierErrorKind::LocalIndexOutOfRange {
                index: 2,
                max_locals: 2
            })
        );
    }

    #[test]
    fn dirty_states_in_discovery_order() {
        let mut store = StateStore::new();
        let mut later = AbstractState::new(7, 0, 0);
        later.dirty = false;
        store.insert(later);
        store.insert(AbstractState::new(3, 0, 0));
        assert_eq!(store.len(), 2);
        assert!(store.get(7).unwrap().dirty, "insertion marks dirty");

        let first = store.next_dirty().unwrap();
        assert_eq!(first.position, 7);
        first.dirty = false;
        assert_eq!(store.next_dirty().map(|state| state.position), Some(3));
        store.get_mut(3).unwrap().dirty = false;
        assert!(store.next_dirty().is_none());

        let positions: Vec<u32> = store.iter().map(|state| state.position).collect();
        assert_eq!(positions, vec![7, 3]);
        assert!(store.get(5).is_none());
    }
}

use super::{Instruction, VerifierErrorKind};
use crate::jvm::opcodes::Flow;
use std::collections::BTreeMap;

/// Positions to which control can go after an instruction
///
/// Every returned position is the start of an instruction. Duplicate targets (eg. a conditional
/// branch to the next instruction) are only listed once, in order of first appearance.
pub fn successors(
    instruction: &Instruction,
    instructions: &BTreeMap<u32, Instruction>,
) -> Result<Vec<u32>, VerifierErrorKind> {
    let fallthrough = || {
        let next = instruction.next_position();
        if instructions.contains_key(&next) {
            Ok(next)
        } else {
            Err(VerifierErrorKind::FallsOffCode)
        }
    };
    let target = |target: i64| match u32::try_from(target) {
        Ok(position) if instructions.contains_key(&position) => Ok(position),
        _ => Err(VerifierErrorKind::InvalidBranchTarget(target)),
    };

    let mut positions = match instruction.description.flow {
        Flow::Next => vec![fallthrough()?],
        Flow::Branch => vec![fallthrough()?, target(instruction.branch_target())?],
        Flow::Goto => vec![target(instruction.branch_target())?],
        Flow::Return | Flow::Throw => vec![],
        Flow::Switch => instruction
            .switch_targets()
            .into_iter()
            .map(target)
            .collect::<Result<Vec<u32>, _>>()?,
        Flow::Subroutine => {
            let mnemonic = instruction.description.mnemonic;
            return Err(VerifierErrorKind::UnsupportedOpcode(mnemonic));
        }
    };

    let mut seen = Vec::with_capacity(positions.len());
    positions.retain(|position| {
        if seen.contains(position) {
            false
        } else {
            seen.push(*position);
            true
        }
    });
    Ok(positions)
}

#[cfg(test)]
mod test {
    use super::super::decode_all;
    use super::*;

    fn successors_at(code: &[u8], position: u32) -> Result<Vec<u32>, VerifierErrorKind> {
        let instructions = decode_all(code).unwrap();
        successors(&instructions[&position], &instructions)
    }

    #[test]
    fn straight_line() {
        // iconst_0, bipush 3, ireturn
        let code = [0x03, 0x10, 0x03, 0xac];
        assert_eq!(successors_at(&code, 0), Ok(vec![1]));
        assert_eq!(successors_at(&code, 1), Ok(vec![3]));
        assert_eq!(successors_at(&code, 3), Ok(vec![]));
    }

    #[test]
    fn falls_off() {
        // iconst_0, pop
        let code = [0x03, 0x57];
        assert_eq!(successors_at(&code, 1), Err(VerifierErrorKind::FallsOffCode));
    }

    #[test]
    fn branches() {
        // 0: iload_0, 1: ifeq +5, 4: iconst_1, 5: ireturn, 6: goto -5, 9: athrow
        let code = [0x1a, 0x99, 0x00, 0x05, 0x04, 0xac, 0xa7, 0xff, 0xfb, 0xbf];
        assert_eq!(successors_at(&code, 1), Ok(vec![4, 6]));
        assert_eq!(successors_at(&code, 6), Ok(vec![1]));
        assert_eq!(successors_at(&code, 9), Ok(vec![]));
    }

    #[test]
    fn branch_to_next() {
        // 0: iconst_0, 1: ifne +3, 4: return
        let code = [0x03, 0x9a, 0x00, 0x03, 0xb1];
        assert_eq!(successors_at(&code, 1), Ok(vec![4]));
    }

    #[test]
    fn bad_targets() {
        // 0: goto +1 (middle of itself), 3: goto -4, 6: goto +10
        let code = [0xa7, 0x00, 0x01, 0xa7, 0xff, 0xfc, 0xa7, 0x00, 0x0a];
        assert_eq!(
            successors_at(&code, 0),
            Err(VerifierErrorKind::InvalidBranchTarget(1))
        );
        assert_eq!(
            successors_at(&code, 3),
            Err(VerifierErrorKind::InvalidBranchTarget(-1))
        );
        assert_eq!(
            successors_at(&code, 6),
            Err(VerifierErrorKind::InvalidBranchTarget(16))
        );
    }

    #[test]
    fn switch_targets() {
        // 0: iconst_0, 1: lookupswitch default=+27 [(1, +28), (2, +27)], 28: return, 29: return
        let mut code = vec![0x03, 0xab, 0x00, 0x00];
        for value in [27i32, 2, 1, 28, 2, 27] {
            code.extend_from_slice(&value.to_be_bytes());
        }
        code.extend_from_slice(&[0xb1, 0xb1]);
        assert_eq!(successors_at(&code, 1), Ok(vec![28, 29]));
    }

    #[test]
    fn subroutines() {
        // 0: jsr +3, 3: return
        let code = [0xa8, 0x00, 0x03, 0xb1];
        assert_eq!(
            successors_at(&code, 0),
            Err(VerifierErrorKind::UnsupportedOpcode("jsr"))
        );
    }
}

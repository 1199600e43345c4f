use std::fmt::Display;

use int_enum::IntEnum;
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use tracing::trace;

use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntEnum)]
#[repr(usize)]
pub enum RegisterName {
    A = 0,
    B = 1,
    C = 2,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registers([BigUint; 3]);

impl Registers {
    pub fn new(a: BigUint, b: BigUint, c: BigUint) -> Self {
        Self([a, b, c])
    }

    pub fn reg(&self, name: RegisterName) -> &BigUint {
        &self.0[usize::from(name)]
    }

    pub fn reg_mut(&mut self, name: RegisterName) -> &mut BigUint {
        &mut self.0[usize::from(name)]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntEnum)]
#[repr(usize)]
pub enum Instruction {
    Adv = 0,
    Bxl = 1,
    Bst = 2,
    Jnz = 3,
    Bxc = 4,
    Out = 5,
    Bdv = 6,
    Cdv = 7,
}

impl Instruction {
    /// Executes on given registers, returns the jump target if the instruction pointer
    /// doesn't simply move to the next instruction.
    fn exec_in(
        &self,
        operand: usize,
        registers: &mut Registers,
        output: &mut Vec<u8>,
    ) -> Result<Option<usize>, Error> {
        if operand > 7 {
            return Err(Error::InvalidOperand(operand));
        }

        match self {
            Instruction::Adv => {
                *registers.reg_mut(RegisterName::A) = Self::shifted_a(operand, registers)?
            }
            Instruction::Bxl => *registers.reg_mut(RegisterName::B) ^= BigUint::from(operand),
            Instruction::Bst => {
                *registers.reg_mut(RegisterName::B) =
                    BigUint::from(low_octal(&Self::combo_operand(operand, registers)?))
            }
            Instruction::Jnz => {
                if !registers.reg(RegisterName::A).is_zero() {
                    return Ok(Some(operand));
                }
            }
            Instruction::Bxc => {
                let c = registers.reg(RegisterName::C).clone();
                *registers.reg_mut(RegisterName::B) ^= c;
            }
            Instruction::Out => output.push(low_octal(&Self::combo_operand(operand, registers)?)),
            Instruction::Bdv => {
                *registers.reg_mut(RegisterName::B) = Self::shifted_a(operand, registers)?
            }
            Instruction::Cdv => {
                *registers.reg_mut(RegisterName::C) = Self::shifted_a(operand, registers)?
            }
        }

        Ok(None)
    }

    fn combo_operand(operand: usize, registers: &Registers) -> Result<BigUint, Error> {
        match operand {
            0..=3 => Ok(BigUint::from(operand)),
            4 => Ok(registers.reg(RegisterName::A).clone()),
            5 => Ok(registers.reg(RegisterName::B).clone()),
            6 => Ok(registers.reg(RegisterName::C).clone()),
            other => Err(Error::InvalidComboOperand(other)),
        }
    }

    // A / 2^combo, a shift too wide for usize always leaves nothing.
    fn shifted_a(operand: usize, registers: &Registers) -> Result<BigUint, Error> {
        let shift = Self::combo_operand(operand, registers)?;
        Ok(match shift.to_usize() {
            Some(shift) => registers.reg(RegisterName::A) >> shift,
            None => BigUint::zero(),
        })
    }
}

fn low_octal(value: &BigUint) -> u8 {
    (value % 8u32).to_u8().unwrap_or_default()
}

pub(crate) fn join_digits<T: Display>(values: &[T]) -> String {
    values
        .iter()
        .map(|n| format!("{}", n))
        .collect::<Vec<_>>()
        .join(",")
}

/// The 3-bit computer: a fixed program run against registers A, B and C.
#[derive(Debug, Clone)]
pub struct Computer {
    program: Vec<usize>,
    registers: Registers,
    inst_ptr: usize,
    output: Vec<u8>,
}

impl Computer {
    pub fn new(registers: Registers, program: Vec<usize>) -> Self {
        Self {
            program,
            registers,
            inst_ptr: 0,
            output: Vec::new(),
        }
    }

    /// Prepares another run with register A set to `init_a`, the others cleared.
    pub fn reset(&mut self, init_a: BigUint) {
        self.registers = Registers::new(init_a, BigUint::zero(), BigUint::zero());
        self.inst_ptr = 0;
        self.output.clear();
    }

    /// Runs until the instruction pointer leaves the program.
    pub fn run(&mut self) -> Result<(), Error> {
        while self.step()? {}

        Ok(())
    }

    /// Executes one instruction, returns false once the computer has halted.
    pub fn step(&mut self) -> Result<bool, Error> {
        let Some(code) = self.program.get(self.inst_ptr).copied() else {
            return Ok(false);
        };
        let Some(operand) = self.program.get(self.inst_ptr + 1).copied() else {
            return Ok(false);
        };
        let inst = Instruction::try_from(code).map_err(Error::InvalidOpcode)?;

        self.inst_ptr = inst
            .exec_in(operand, &mut self.registers, &mut self.output)?
            .unwrap_or(self.inst_ptr + 2);
        trace!(
            ?inst,
            operand,
            a = %self.registers.reg(RegisterName::A),
            b = %self.registers.reg(RegisterName::B),
            c = %self.registers.reg(RegisterName::C),
            inst_ptr = self.inst_ptr,
            "executed instruction"
        );

        Ok(true)
    }

    pub fn output(&self) -> &[u8] {
        &self.output
    }

    pub fn output_text(&self) -> String {
        join_digits(&self.output)
    }

    pub fn program(&self) -> &[usize] {
        &self.program
    }

    pub fn program_text(&self) -> String {
        join_digits(&self.program)
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn inst_ptr(&self) -> usize {
        self.inst_ptr
    }
}

impl Display for Computer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Register A: {}", self.registers.reg(RegisterName::A))?;
        writeln!(f, "Register B: {}", self.registers.reg(RegisterName::B))?;
        writeln!(f, "Register C: {}", self.registers.reg(RegisterName::C))?;
        writeln!(f)?;
        writeln!(f, "Program: {}", self.program_text())?;
        // Caret under the current opcode, assuming single-digit codes.
        writeln!(f, "{}^", " ".repeat(9 + 2 * self.inst_ptr))
    }
}

#[cfg(test)]
fn run_program(a: u64, b: u64, c: u64, program: &[usize]) -> Computer {
    let registers = Registers::new(BigUint::from(a), BigUint::from(b), BigUint::from(c));
    let mut computer = Computer::new(registers, program.to_vec());
    computer.run().unwrap();
    computer
}

#[test]
fn test_bst_from_register_c() {
    let computer = run_program(0, 0, 9, &[2, 6]);
    assert_eq!(*computer.registers().reg(RegisterName::B), BigUint::from(1u32));
}

#[test]
fn test_out_literals_and_register() {
    let computer = run_program(10, 0, 0, &[5, 0, 5, 1, 5, 4]);
    assert_eq!(computer.output_text(), "0,1,2");
}

#[test]
fn test_loop_until_a_is_zero() {
    let computer = run_program(2024, 0, 0, &[0, 1, 5, 4, 3, 0]);
    assert_eq!(computer.output_text(), "4,2,5,6,7,7,7,7,3,1,0");
    assert!(computer.registers().reg(RegisterName::A).is_zero());
}

#[test]
fn test_bxl_and_bxc() {
    let computer = run_program(0, 29, 0, &[1, 7]);
    assert_eq!(*computer.registers().reg(RegisterName::B), BigUint::from(26u32));

    let computer = run_program(0, 2024, 43690, &[4, 0]);
    assert_eq!(*computer.registers().reg(RegisterName::B), BigUint::from(44354u32));
}

#[test]
fn test_debugger_example() {
    let computer = run_program(729, 0, 0, &[0, 1, 5, 4, 3, 0]);
    assert_eq!(computer.output_text(), "4,6,3,5,6,3,5,2,1,0");
}

#[test]
fn test_divide_by_one() {
    let computer = run_program(13, 0, 0, &[0, 0, 6, 0, 7, 0]);
    let registers = computer.registers();
    assert_eq!(*registers.reg(RegisterName::A), BigUint::from(13u32));
    assert_eq!(*registers.reg(RegisterName::B), BigUint::from(13u32));
    assert_eq!(*registers.reg(RegisterName::C), BigUint::from(13u32));
}

#[test]
fn test_divide_zero_halts_silently() {
    let computer = run_program(0, 0, 0, &[0, 3]);
    assert!(computer.output().is_empty());
    assert!(computer.registers().reg(RegisterName::A).is_zero());
    assert_eq!(computer.inst_ptr(), 2);
}

#[test]
fn test_emit_register_a() {
    let computer = run_program(7, 0, 0, &[5, 4]);
    assert_eq!(computer.output(), &[7]);
}

#[test]
fn test_jump_falls_through_on_zero() {
    let computer = run_program(0, 0, 0, &[3, 0, 5, 4]);
    assert_eq!(computer.output(), &[0]);
    assert_eq!(computer.inst_ptr(), 4);
}

#[test]
fn test_jump_is_absolute() {
    // A = 5: jump over the first emit straight to the divide.
    let computer = run_program(5, 0, 0, &[3, 4, 5, 1, 0, 3, 5, 4]);
    assert_eq!(computer.output(), &[0]);
}

#[test]
fn test_registers_beyond_u64() {
    let a = BigUint::from(8u32).pow(30) + BigUint::from(5u32);
    let mut computer = Computer::new(
        Registers::new(a.clone(), BigUint::zero(), BigUint::zero()),
        vec![5, 4, 7, 4, 0, 3, 3, 0],
    );
    computer.run().unwrap();
    let mut expected: Vec<u8> = vec![5];
    expected.extend(std::iter::repeat(0).take(29));
    expected.push(1);
    assert_eq!(computer.output(), expected.as_slice());
    // Shifting A by A itself empties C.
    assert!(computer.registers().reg(RegisterName::C).is_zero());
}

#[test]
fn test_run_is_deterministic() {
    let program = [2, 4, 1, 3, 7, 5, 4, 1, 1, 3, 0, 3, 5, 5, 3, 0];
    let first = run_program(46323429, 0, 0, &program);
    let second = run_program(46323429, 0, 0, &program);
    assert_eq!(first.output(), second.output());
    assert_eq!(first.registers(), second.registers());
}

#[test]
fn test_reset_clears_state() {
    let mut computer = run_program(2024, 0, 0, &[0, 1, 5, 4, 3, 0]);
    computer.reset(BigUint::from(729u32));
    assert!(computer.output().is_empty());
    assert_eq!(computer.inst_ptr(), 0);
    computer.run().unwrap();
    assert_eq!(computer.output_text(), "4,6,3,5,6,3,5,2,1,0");
}

#[test]
fn test_invalid_instructions() {
    let registers = Registers::default();
    let mut computer = Computer::new(registers.clone(), vec![5, 7]);
    assert!(matches!(computer.run(), Err(Error::InvalidComboOperand(7))));

    let mut computer = Computer::new(registers.clone(), vec![8, 0]);
    assert!(matches!(computer.run(), Err(Error::InvalidOpcode(8))));

    let mut computer = Computer::new(registers, vec![1, 9]);
    assert!(matches!(computer.run(), Err(Error::InvalidOperand(9))));
}

#[test]
fn test_debugger_view() {
    let mut computer = Computer::new(
        Registers::new(BigUint::from(729u32), BigUint::zero(), BigUint::zero()),
        vec![0, 1, 5, 4, 3, 0],
    );
    computer.step().unwrap();
    let expected = format!(
        "Register A: 364\nRegister B: 0\nRegister C: 0\n\nProgram: 0,1,5,4,3,0\n{}^\n",
        " ".repeat(13)
    );
    assert_eq!(computer.to_string(), expected);
}

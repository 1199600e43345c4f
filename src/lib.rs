mod computer;
mod search;

use std::{error, fmt::Display, fs, path::Path, path::PathBuf, str::FromStr};

use anyhow::{Context, Result};
use clap::Parser;
use num_bigint::BigUint;
use tracing_subscriber::{fmt, EnvFilter};

pub use computer::{Computer, Instruction, RegisterName, Registers};
pub use search::{
    loss, mismatch_penalty, program_target, Candidate, Evaluation, Optimizer, SearchConfig,
    INFEASIBLE_PENALTY, MISMATCH_SCALE,
};

#[derive(Debug)]
pub enum Error {
    NoRegisterLine(RegisterName),
    NoProgram,
    InvalidRegisterText(String),
    InvalidRegisterValue(String),
    InvalidProgramText(String),
    InvalidCode(String),
    InvalidOpcode(usize),
    InvalidOperand(usize),
    InvalidComboOperand(usize),
    InvalidDigit(u8),
    UnreachableTarget(usize),
    InvalidSearchConfig(&'static str),
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NoRegisterLine(name) => write!(
                f,
                "Can't find line for register {:?} in debug information.",
                name
            ),
            Error::NoProgram => write!(f, "Can't find line for program in debug information."),
            Error::InvalidRegisterText(s) => write!(f, "Invalid text({}) for register.", s),
            Error::InvalidRegisterValue(s) => write!(f, "Invalid text({}) for register value.", s),
            Error::InvalidProgramText(s) => write!(f, "Invalid text({}) for program.", s),
            Error::InvalidCode(s) => write!(f, "Invalid text({}) for code.", s),
            Error::InvalidOpcode(n) => write!(f, "Invalid operation code({}).", n),
            Error::InvalidOperand(n) => write!(f, "Invalid operation number({}).", n),
            Error::InvalidComboOperand(n) => write!(f, "Invalid combo operation number({}).", n),
            Error::InvalidDigit(d) => write!(f, "Invalid octal digit({}) in candidate.", d),
            Error::UnreachableTarget(n) => write!(
                f,
                "Target value({}) can never be output, only 0 to 7 are possible.",
                n
            ),
            Error::InvalidSearchConfig(field) => {
                write!(f, "Search configuration needs a positive {}.", field)
            }
        }
    }
}

impl error::Error for Error {}

#[derive(Debug, Parser)]
pub struct CLIArgs {
    pub input_path: PathBuf,
}

#[derive(Debug, Parser)]
pub struct SearchCLIArgs {
    pub input_path: PathBuf,
    /// Number of octal digits in each candidate value of register A.
    #[arg(long, default_value_t = search::DEFAULT_DIGITS)]
    pub digits: usize,
    #[arg(long, default_value_t = search::DEFAULT_GENERATIONS)]
    pub generations: usize,
    /// Candidates kept between generations.
    #[arg(long, default_value_t = search::DEFAULT_POPULATION)]
    pub population: usize,
    /// Mutated copies made of each kept candidate.
    #[arg(long, default_value_t = search::DEFAULT_MUTATIONS)]
    pub mutations: usize,
    #[arg(long, default_value_t = search::DEFAULT_RANDOMS)]
    pub randoms: usize,
    #[arg(long, default_value_t = search::DEFAULT_CROSSOVERS)]
    pub crossovers: usize,
    #[arg(long, default_value_t = search::DEFAULT_SEED)]
    pub seed: u64,
    /// Extra digits to try, one at a time, when no exact match is found.
    #[arg(long, default_value_t = 0)]
    pub widen: usize,
}

impl From<&SearchCLIArgs> for SearchConfig {
    fn from(args: &SearchCLIArgs) -> Self {
        Self {
            digits: args.digits,
            generations: args.generations,
            population: args.population,
            mutations: args.mutations,
            randoms: args.randoms,
            crossovers: args.crossovers,
            seed: args.seed,
            widen: args.widen,
        }
    }
}

/// Initial registers and program as shown by the debugger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugInfo {
    pub registers: Registers,
    pub program: Vec<usize>,
}

impl FromStr for DebugInfo {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut lines = s.lines();
        let mut registers = Registers::default();
        for name in [RegisterName::A, RegisterName::B, RegisterName::C] {
            let line = lines.next().ok_or(Error::NoRegisterLine(name))?;
            *registers.reg_mut(name) = read_register(name, line)?;
        }

        let program_line = lines
            .find(|l| !l.trim().is_empty())
            .ok_or(Error::NoProgram)?;
        let program = read_program(program_line)?;

        Ok(Self { registers, program })
    }
}

impl From<DebugInfo> for Computer {
    fn from(info: DebugInfo) -> Self {
        Computer::new(info.registers, info.program)
    }
}

pub fn read_debug_info<P: AsRef<Path>>(path: P) -> Result<DebugInfo> {
    let text = fs::read_to_string(&path)
        .with_context(|| format!("Failed to open given file({}).", path.as_ref().display()))?;
    text.parse::<DebugInfo>().with_context(|| {
        format!(
            "Failed to parse debug information in given file({}).",
            path.as_ref().display()
        )
    })
}

fn read_register(name: RegisterName, text: &str) -> Result<BigUint, Error> {
    let header = format!("Register {:?}:", name);
    let start_ind = text
        .find(&header)
        .ok_or(Error::InvalidRegisterText(text.to_string()))?;
    let value_text = text[(start_ind + header.len())..].trim();
    value_text
        .parse::<BigUint>()
        .map_err(|_| Error::InvalidRegisterValue(value_text.to_string()))
}

fn read_program(text: &str) -> Result<Vec<usize>, Error> {
    static HEADER: &str = "Program:";
    let start_ind = text
        .find(HEADER)
        .ok_or(Error::InvalidProgramText(text.to_string()))?;
    let code_text = text[(start_ind + HEADER.len())..].trim();
    code_text
        .split(',')
        .map(|s| {
            let s = s.trim();
            s.parse::<usize>()
                .map_err(|_| Error::InvalidCode(s.to_string()))
        })
        .collect()
}

/// Sets up logging to stderr, `RUST_LOG` overrides the default filter.
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,chronospatial=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[test]
fn test_parse_debug_info() {
    let text = "Register A: 729\nRegister B: 0\nRegister C: 0\n\nProgram: 0,1,5,4,3,0\n";
    let info = text.parse::<DebugInfo>().unwrap();
    assert_eq!(*info.registers.reg(RegisterName::A), BigUint::from(729u32));
    assert_eq!(*info.registers.reg(RegisterName::B), BigUint::from(0u32));
    assert_eq!(info.program, vec![0, 1, 5, 4, 3, 0]);
}

#[test]
fn test_parse_huge_register() {
    let text = "Register A: 123456789012345678901234567890\nRegister B: 0\nRegister C: 7\n\nProgram: 5,4";
    let info = text.parse::<DebugInfo>().unwrap();
    assert_eq!(
        info.registers.reg(RegisterName::A).to_string(),
        "123456789012345678901234567890"
    );
    assert_eq!(*info.registers.reg(RegisterName::C), BigUint::from(7u32));
}

#[test]
fn test_parse_errors() {
    assert!(matches!(
        "Register A: 1\nRegister B: 0\n".parse::<DebugInfo>(),
        Err(Error::NoRegisterLine(RegisterName::C))
    ));
    assert!(matches!(
        "Register A: 1\nRegister B: 0\nRegister C: 0\n\n".parse::<DebugInfo>(),
        Err(Error::NoProgram)
    ));
    assert!(matches!(
        "Register A: -1\nRegister B: 0\nRegister C: 0\n\nProgram: 0".parse::<DebugInfo>(),
        Err(Error::InvalidRegisterValue(_))
    ));
    assert!(matches!(
        "Register A: 1\nRegister B: 0\nRegister C: 0\n\nProgram: 0,x".parse::<DebugInfo>(),
        Err(Error::InvalidCode(_))
    ));
}

use std::{collections::HashSet, f64::consts::LN_2, fmt::Display};

use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use tracing::{debug, info, warn};

use crate::{computer::join_digits, Computer, Error};

pub const DEFAULT_DIGITS: usize = 16;
pub const DEFAULT_GENERATIONS: usize = 10;
pub const DEFAULT_POPULATION: usize = 10;
pub const DEFAULT_MUTATIONS: usize = 80;
pub const DEFAULT_RANDOMS: usize = 100;
pub const DEFAULT_CROSSOVERS: usize = 100;
pub const DEFAULT_SEED: u64 = 123;

/// Penalty for an output whose length differs from the target.
pub const INFEASIBLE_PENALTY: f64 = 1e12;
/// Penalty when every output value differs from the target.
pub const MISMATCH_SCALE: f64 = 1000.0;

const OCTAL: u8 = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchConfig {
    /// Octal digits in each candidate.
    pub digits: usize,
    pub generations: usize,
    /// Candidates kept from one generation to the next.
    pub population: usize,
    /// Mutated copies made of every kept candidate.
    pub mutations: usize,
    /// Fresh random candidates added each generation.
    pub randoms: usize,
    /// Crossover children added each generation.
    pub crossovers: usize,
    pub seed: u64,
    /// How many times to retry with one more digit if no exact match is found.
    pub widen: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            digits: DEFAULT_DIGITS,
            generations: DEFAULT_GENERATIONS,
            population: DEFAULT_POPULATION,
            mutations: DEFAULT_MUTATIONS,
            randoms: DEFAULT_RANDOMS,
            crossovers: DEFAULT_CROSSOVERS,
            seed: DEFAULT_SEED,
            widen: 0,
        }
    }
}

impl SearchConfig {
    fn check(&self) -> Result<(), Error> {
        if self.digits == 0 {
            return Err(Error::InvalidSearchConfig("digits"));
        }
        if self.population == 0 {
            return Err(Error::InvalidSearchConfig("population"));
        }

        Ok(())
    }
}

/// Octal digits of a trial value for register A, least significant first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Candidate(Vec<u8>);

impl TryFrom<Vec<u8>> for Candidate {
    type Error = Error;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        if let Some(&d) = value.iter().find(|&&d| d >= OCTAL) {
            return Err(Error::InvalidDigit(d));
        }

        Ok(Self(value))
    }
}

impl Candidate {
    pub fn random<R: Rng + ?Sized>(len: usize, rng: &mut R) -> Self {
        Self((0..len).map(|_| rng.gen_range(0..OCTAL)).collect())
    }

    pub fn digits(&self) -> &[u8] {
        &self.0
    }

    pub fn value(&self) -> BigUint {
        self.0
            .iter()
            .rev()
            .fold(BigUint::zero(), |acc, &d| acc * OCTAL + d)
    }

    /// Copy with one random position redrawn.
    pub fn mutated<R: Rng + ?Sized>(&self, rng: &mut R) -> Self {
        let mut digits = self.0.clone();
        if !digits.is_empty() {
            let ind = rng.gen_range(0..digits.len());
            digits[ind] = rng.gen_range(0..OCTAL);
        }

        Self(digits)
    }

    /// Child taking half of its positions, picked at random, from `other`.
    pub fn crossover<R: Rng + ?Sized>(&self, other: &Self, rng: &mut R) -> Self {
        let mut inds = (0..self.0.len()).collect::<Vec<_>>();
        inds.shuffle(rng);
        let mut digits = self.0.clone();
        for &ind in &inds[..(inds.len() / 2)] {
            digits[ind] = other.0[ind];
        }

        Self(digits)
    }
}

impl Display for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", join_digits(&self.0))
    }
}

/// Program values as output digits to aim for.
pub fn program_target(program: &[usize]) -> Result<Vec<u8>, Error> {
    program
        .iter()
        .map(|&n| {
            u8::try_from(n)
                .ok()
                .filter(|&d| d < OCTAL)
                .ok_or(Error::UnreachableTarget(n))
        })
        .collect()
}

pub fn mismatch_penalty(output: &[u8], target: &[u8]) -> f64 {
    if output.len() != target.len() {
        return INFEASIBLE_PENALTY;
    }
    if target.is_empty() {
        return 0.0;
    }

    let miss_count = output.iter().zip(target).filter(|(o, t)| o != t).count();
    miss_count as f64 / target.len() as f64 * MISMATCH_SCALE
}

pub fn loss(output: &[u8], target: &[u8], value: &BigUint) -> f64 {
    mismatch_penalty(output, target) + ln(value)
}

// ln(0) is taken as 0 so that zero doesn't beat everything.
fn ln(value: &BigUint) -> f64 {
    let bits = value.bits();
    if bits == 0 {
        return 0.0;
    }

    let shift = bits.saturating_sub(f64::MANTISSA_DIGITS as u64);
    let top = (value >> shift).to_f64().unwrap_or(f64::INFINITY);
    top.ln() + shift as f64 * LN_2
}

/// One scored candidate.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub candidate: Candidate,
    pub value: BigUint,
    pub output: Vec<u8>,
    pub penalty: f64,
    pub loss: f64,
}

impl Evaluation {
    /// Whether the candidate reproduces the target exactly.
    pub fn is_exact(&self) -> bool {
        self.penalty == 0.0
    }

    fn new(computer: &mut Computer, target: &[u8], candidate: Candidate) -> Self {
        let value = candidate.value();
        computer.reset(value.clone());
        let (output, penalty) = match computer.run() {
            Ok(()) => {
                let output = computer.output().to_vec();
                let penalty = mismatch_penalty(&output, target);
                (output, penalty)
            }
            Err(e) => {
                debug!(%candidate, error = %e, "candidate failed to run");
                (computer.output().to_vec(), INFEASIBLE_PENALTY)
            }
        };
        let loss = penalty + ln(&value);

        Self {
            candidate,
            value,
            output,
            penalty,
            loss,
        }
    }
}

/// Evolves candidates until running the program with one of them as register A
/// outputs the target.
pub struct Optimizer<R> {
    computer: Computer,
    target: Vec<u8>,
    config: SearchConfig,
    rng: R,
}

impl Optimizer<StdRng> {
    pub fn seeded(computer: Computer, target: Vec<u8>, config: SearchConfig) -> Result<Self, Error> {
        let rng = StdRng::seed_from_u64(config.seed);
        Self::with_rng(computer, target, config, rng)
    }
}

impl<R: Rng> Optimizer<R> {
    pub fn with_rng(
        computer: Computer,
        target: Vec<u8>,
        config: SearchConfig,
        rng: R,
    ) -> Result<Self, Error> {
        config.check()?;

        Ok(Self {
            computer,
            target,
            config,
            rng,
        })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn evaluate(&self, candidate: &Candidate) -> Evaluation {
        Evaluation::new(&mut self.computer.clone(), &self.target, candidate.clone())
    }

    /// Runs the configured generations, widening the candidates if asked to, and
    /// returns the best candidate found.
    pub fn run(&mut self) -> Evaluation {
        let mut best = self.run_with_digits(self.config.digits);
        for extra in 1..=self.config.widen {
            if best.is_exact() {
                break;
            }

            let digits = self.config.digits + extra;
            warn!(digits, loss = best.loss, "no exact match, retrying with more digits");
            let outcome = self.run_with_digits(digits);
            if outcome.loss < best.loss {
                best = outcome;
            }
        }

        best
    }

    fn run_with_digits(&mut self, digits: usize) -> Evaluation {
        let target_text = join_digits(&self.target);
        let seeds = (0..self.config.population)
            .map(|_| Candidate::random(digits, &mut self.rng))
            .collect::<Vec<_>>();
        let mut selected = self.select(self.score(seeds));

        for gen_ind in 0..self.config.generations {
            let population = selected
                .iter()
                .map(|e| e.candidate.clone())
                .collect::<Vec<_>>();
            selected = self.step(&population);

            info!(
                generation = gen_ind + 1,
                best = %selected[0].value,
                loss = selected[0].loss,
                "generation completed"
            );
            debug!(expected = %target_text, "search target");
            for e in &selected {
                debug!(
                    candidate = %e.candidate,
                    value = %e.value,
                    result = %join_digits(&e.output),
                    loss = e.loss
                );
            }
        }

        selected.swap_remove(0)
    }

    /// Expands, scores and selects one generation.
    fn step(&mut self, population: &[Candidate]) -> Vec<Evaluation> {
        let pool = self.next_pool(population);
        self.select(self.score(pool))
    }

    fn next_pool(&mut self, population: &[Candidate]) -> Vec<Candidate> {
        let digits = population.first().map_or(self.config.digits, |c| c.0.len());
        let mut pool = Vec::with_capacity(
            population.len() * (self.config.mutations + 1)
                + self.config.randoms
                + self.config.crossovers,
        );

        for candidate in population {
            pool.push(candidate.clone());
            for _ in 0..self.config.mutations {
                pool.push(candidate.mutated(&mut self.rng));
            }
        }

        for _ in 0..self.config.randoms {
            pool.push(Candidate::random(digits, &mut self.rng));
        }

        for _ in 0..self.config.crossovers {
            let i = self.rng.gen_range(0..population.len());
            let j = self.rng.gen_range(0..population.len());
            pool.push(population[i].crossover(&population[j], &mut self.rng));
        }

        pool
    }

    // Each worker runs its own copy of the computer, results keep pool order.
    fn score(&self, pool: Vec<Candidate>) -> Vec<Evaluation> {
        let computer = &self.computer;
        let target = &self.target;
        pool.par_iter()
            .map_init(
                || computer.clone(),
                |computer, candidate| Evaluation::new(computer, target, candidate.clone()),
            )
            .collect()
    }

    /// Keeps the best unique candidates, ties stay in pool order.
    fn select(&self, mut evaluations: Vec<Evaluation>) -> Vec<Evaluation> {
        evaluations.sort_by(|a, b| a.loss.total_cmp(&b.loss));

        let mut seen = HashSet::new();
        evaluations
            .into_iter()
            .filter(|e| seen.insert(e.candidate.clone()))
            .take(self.config.population)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Registers;

    fn quine_computer() -> Computer {
        Computer::new(Registers::default(), vec![0, 3, 5, 4, 3, 0])
    }

    #[test]
    fn test_candidate_value() {
        let candidate = Candidate::try_from(vec![0, 0, 3, 5, 4, 3]).unwrap();
        assert_eq!(candidate.value(), BigUint::from(117440u32));
        assert_eq!(candidate.to_string(), "0,0,3,5,4,3");
        assert!(Candidate::try_from(vec![1, 8]).is_err());
    }

    #[test]
    fn test_mismatch_penalty() {
        assert_eq!(mismatch_penalty(&[1, 2], &[1, 2, 3]), INFEASIBLE_PENALTY);
        assert_eq!(mismatch_penalty(&[1, 2, 3, 4], &[1, 2, 3, 4]), 0.0);
        assert_eq!(mismatch_penalty(&[1, 0, 3, 0], &[1, 2, 3, 4]), 500.0);
        assert_eq!(mismatch_penalty(&[], &[]), 0.0);
    }

    #[test]
    fn test_loss_prefers_smaller_exact_value() {
        let target = [0, 3, 5, 4, 3, 0];
        let small = loss(&target, &target, &BigUint::from(117440u32));
        let large = loss(&target, &target, &BigUint::from(117447u32));
        assert!(small < large);
        assert!((small - 117440f64.ln()).abs() < 1e-9);
        assert_eq!(loss(&[], &[], &BigUint::zero()), 0.0);
    }

    #[test]
    fn test_ln_of_huge_value() {
        let value = BigUint::from(8u32).pow(400);
        assert!((ln(&value) - 400.0 * 8f64.ln()).abs() < 1e-6);
    }

    #[test]
    fn test_evaluate_exact_candidate() {
        let optimizer =
            Optimizer::seeded(quine_computer(), vec![0, 3, 5, 4, 3, 0], SearchConfig::default())
                .unwrap();
        let evaluation = optimizer.evaluate(&Candidate::try_from(vec![0, 0, 3, 5, 4, 3]).unwrap());
        assert!(evaluation.is_exact());
        assert_eq!(evaluation.output, vec![0, 3, 5, 4, 3, 0]);

        let evaluation = optimizer.evaluate(&Candidate::try_from(vec![0, 0, 3, 5, 4, 0]).unwrap());
        assert!(!evaluation.is_exact());
        assert!(evaluation.loss >= INFEASIBLE_PENALTY);
    }

    #[test]
    fn test_failed_run_is_infeasible() {
        let computer = Computer::new(Registers::default(), vec![5, 7]);
        let optimizer = Optimizer::seeded(computer, vec![5, 7], SearchConfig::default()).unwrap();
        let evaluation = optimizer.evaluate(&Candidate::try_from(vec![1]).unwrap());
        assert_eq!(evaluation.penalty, INFEASIBLE_PENALTY);
    }

    #[test]
    fn test_invalid_config() {
        let config = SearchConfig {
            digits: 0,
            ..SearchConfig::default()
        };
        assert!(matches!(
            Optimizer::seeded(quine_computer(), vec![0], config),
            Err(Error::InvalidSearchConfig("digits"))
        ));
    }

    #[test]
    fn test_program_target() {
        assert_eq!(program_target(&[2, 4, 1, 7]).unwrap(), vec![2, 4, 1, 7]);
        assert!(matches!(
            program_target(&[2, 8]),
            Err(Error::UnreachableTarget(8))
        ));
    }

    #[test]
    fn test_crossover_takes_from_both_parents() {
        let mut rng = StdRng::seed_from_u64(7);
        let zeros = Candidate::try_from(vec![0; 8]).unwrap();
        let sevens = Candidate::try_from(vec![7; 8]).unwrap();
        let child = zeros.crossover(&sevens, &mut rng);
        assert_eq!(child.digits().iter().filter(|&&d| d == 7).count(), 4);
        assert_eq!(child.digits().iter().filter(|&&d| d == 0).count(), 4);
    }

    #[test]
    fn test_mutation_changes_at_most_one_digit() {
        let mut rng = StdRng::seed_from_u64(7);
        let candidate = Candidate::random(16, &mut rng);
        for _ in 0..100 {
            let mutant = candidate.mutated(&mut rng);
            let diff_count = candidate
                .digits()
                .iter()
                .zip(mutant.digits())
                .filter(|(a, b)| a != b)
                .count();
            assert!(diff_count <= 1);
        }
    }

    #[test]
    fn test_population_stays_unique() {
        let config = SearchConfig {
            digits: 3,
            ..SearchConfig::default()
        };
        let mut optimizer =
            Optimizer::seeded(quine_computer(), vec![0, 3, 5, 4, 3, 0], config).unwrap();
        let mut population = vec![Candidate::try_from(vec![1, 2, 3]).unwrap(); 10];
        for _ in 0..5 {
            let selected = optimizer.step(&population);
            assert_eq!(selected.len(), 10);
            let values = selected.iter().map(|e| e.value.clone()).collect::<HashSet<_>>();
            assert_eq!(values.len(), selected.len());
            assert!(selected.windows(2).all(|w| w[0].loss <= w[1].loss));
            population = selected.into_iter().map(|e| e.candidate).collect();
        }
    }

    #[test]
    fn test_search_finds_lowest_quine_value() {
        let config = SearchConfig {
            digits: 6,
            generations: 50,
            ..SearchConfig::default()
        };
        let computer = quine_computer();
        let target = program_target(computer.program()).unwrap();
        let mut optimizer = Optimizer::seeded(computer, target, config).unwrap();
        let best = optimizer.run();
        assert!(best.is_exact());
        assert_eq!(best.value, BigUint::from(117440u32));
    }

    #[test]
    fn test_search_is_reproducible() {
        let config = SearchConfig {
            digits: 6,
            generations: 3,
            ..SearchConfig::default()
        };
        let target = vec![0, 3, 5, 4, 3, 0];
        let first = Optimizer::seeded(quine_computer(), target.clone(), config.clone())
            .unwrap()
            .run();
        let second = Optimizer::seeded(quine_computer(), target, config)
            .unwrap()
            .run();
        assert_eq!(first.candidate, second.candidate);
        assert_eq!(first.loss, second.loss);
    }

    #[test]
    fn test_widen_recovers_from_short_candidates() {
        let config = SearchConfig {
            digits: 4,
            generations: 50,
            widen: 2,
            ..SearchConfig::default()
        };
        let mut optimizer =
            Optimizer::seeded(quine_computer(), vec![0, 3, 5, 4, 3, 0], config).unwrap();
        let best = optimizer.run();
        assert!(best.is_exact());
        assert_eq!(best.value, BigUint::from(117440u32));
    }
}

//! Temperature-scaled softmax sampling over next-character logits

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Softmax temperature, always finite and strictly positive.
///
/// Values above 1 flatten the distribution, values below 1 sharpen it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Temperature(f32);

impl Temperature {
    pub const DEFAULT: Self = Self(1.0);

    /// Returns `None` for zero, negative, NaN or infinite values.
    pub fn new(value: f32) -> Option<Self> {
        (value.is_finite() && value > 0.0).then_some(Self(value))
    }

    /// Accept any value, falling back to [`Temperature::DEFAULT`] when it is unusable.
    pub fn or_default(value: Option<f32>) -> Self {
        value.and_then(Self::new).unwrap_or_default()
    }

    /// Parse a user-entered field. Blank or non-numeric input yields the default.
    pub fn parse(input: &str) -> Self {
        Self::or_default(input.trim().parse::<f32>().ok())
    }

    pub fn get(self) -> f32 {
        self.0
    }
}

impl Default for Temperature {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Sampling parameters fixed for the lifetime of a generation session
#[derive(Debug, Clone, Default)]
pub struct SamplingConfig {
    pub temperature: Temperature,
    /// Seed for the PRNG. Same seed + same logits → same index.
    pub seed: Option<u64>,
}

/// Convert logits into a probability distribution.
///
/// Logits are divided by the temperature and shifted by their maximum before
/// exponentiation. The result sums to 1 within floating-point tolerance.
pub fn softmax(logits: &[f32], temperature: Temperature) -> Vec<f64> {
    let t = f64::from(temperature.get());
    let scaled: Vec<f64> = logits.iter().map(|&l| f64::from(l) / t).collect();
    let max = scaled.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let exps: Vec<f64> = scaled.iter().map(|&s| (s - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Shannon entropy (nats) of a probability distribution
pub fn entropy(probs: &[f64]) -> f64 {
    probs
        .iter()
        .filter(|&&p| p > 0.0)
        .map(|&p| -p * p.ln())
        .sum()
}

/// Roulette-wheel selection.
///
/// Returns the first index whose cumulative probability exceeds `draw`, or
/// the last index when rounding keeps the total at or below `draw`.
pub fn pick_index(probs: &[f64], draw: f64) -> usize {
    let mut cumulative = 0.0;
    for (i, p) in probs.iter().enumerate() {
        cumulative += p;
        if draw < cumulative {
            return i;
        }
    }
    probs.len().saturating_sub(1)
}

/// Sample one index from `logits` using the given random source.
pub fn sample_with<R: Rng + ?Sized>(
    logits: &[f32],
    temperature: Temperature,
    rng: &mut R,
) -> usize {
    let probs = softmax(logits, temperature);
    let draw: f64 = rng.random();
    pick_index(&probs, draw)
}

/// Stateful sampler owning its random source
#[derive(Debug, Clone)]
pub struct Sampler {
    temperature: Temperature,
    rng: StdRng,
}

impl Sampler {
    pub fn new(config: &SamplingConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            temperature: config.temperature,
            rng,
        }
    }

    pub fn temperature(&self) -> Temperature {
        self.temperature
    }

    /// Draw the next index for a vocabulary-sized logits slice.
    pub fn sample(&mut self, logits: &[f32]) -> usize {
        sample_with(logits, self.temperature, &mut self.rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGITS: [f32; 6] = [2.0, -1.0, 0.5, 3.5, 0.0, -4.0];

    #[test]
    fn test_temperature_validation() {
        assert!(Temperature::new(0.0).is_none());
        assert!(Temperature::new(-1.0).is_none());
        assert!(Temperature::new(f32::NAN).is_none());
        assert!(Temperature::new(f32::INFINITY).is_none());
        assert_eq!(Temperature::new(0.5).map(Temperature::get), Some(0.5));
    }

    #[test]
    fn test_temperature_parse_defaults() {
        assert_eq!(Temperature::parse(""), Temperature::DEFAULT);
        assert_eq!(Temperature::parse("warm"), Temperature::DEFAULT);
        assert_eq!(Temperature::parse("0"), Temperature::DEFAULT);
        assert_eq!(Temperature::parse(" 0.8 ").get(), 0.8);
    }

    #[test]
    fn test_softmax_is_distribution() {
        for t in [0.1, 0.5, 1.0, 2.0, 10.0] {
            let probs = softmax(&LOGITS, Temperature::new(t).unwrap());
            let sum: f64 = probs.iter().sum();
            assert!((sum - 1.0).abs() < 1e-6, "sum {} at t={}", sum, t);
            assert!(probs.iter().all(|&p| (0.0..=1.0).contains(&p)));
        }
    }

    #[test]
    fn test_softmax_handles_large_logits() {
        let probs = softmax(&[1000.0, 999.0, -1000.0], Temperature::DEFAULT);
        assert!(probs.iter().all(|p| p.is_finite()));
        assert!(probs[0] > probs[1]);
    }

    #[test]
    fn test_entropy_grows_with_temperature() {
        let mut previous = f64::NEG_INFINITY;
        for t in [0.05, 0.2, 0.5, 1.0, 1.5, 3.0, 8.0, 50.0] {
            let h = entropy(&softmax(&LOGITS, Temperature::new(t).unwrap()));
            assert!(h + 1e-12 >= previous, "entropy dropped at t={}", t);
            previous = h;
        }
        assert!(previous <= (LOGITS.len() as f64).ln() + 1e-9);
    }

    #[test]
    fn test_pick_index_walks_cdf() {
        let probs = [0.2, 0.5, 0.3];
        assert_eq!(pick_index(&probs, 0.0), 0);
        assert_eq!(pick_index(&probs, 0.19), 0);
        assert_eq!(pick_index(&probs, 0.2), 1);
        assert_eq!(pick_index(&probs, 0.69), 1);
        assert_eq!(pick_index(&probs, 0.71), 2);
    }

    #[test]
    fn test_pick_index_rounding_fallback() {
        // Cumulative total never exceeds the draw
        let probs = [0.3, 0.3, 0.3];
        assert_eq!(pick_index(&probs, 0.95), 2);
    }

    #[test]
    fn test_sample_always_in_range() {
        let mut sampler = Sampler::new(&SamplingConfig {
            temperature: Temperature::new(3.0).unwrap(),
            seed: Some(7),
        });
        for _ in 0..1000 {
            assert!(sampler.sample(&LOGITS) < LOGITS.len());
        }
    }

    #[test]
    fn test_seeded_sampling_is_reproducible() {
        let config = SamplingConfig {
            temperature: Temperature::DEFAULT,
            seed: Some(1234),
        };
        let mut a = Sampler::new(&config);
        let mut b = Sampler::new(&config);
        let first: Vec<usize> = (0..64).map(|_| a.sample(&LOGITS)).collect();
        let second: Vec<usize> = (0..64).map(|_| b.sample(&LOGITS)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_low_temperature_approaches_argmax() {
        let mut sampler = Sampler::new(&SamplingConfig {
            temperature: Temperature::new(0.01).unwrap(),
            seed: Some(3),
        });
        for _ in 0..100 {
            assert_eq!(sampler.sample(&LOGITS), 3);
        }
    }

    #[test]
    fn test_single_logit() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(sample_with(&[0.3], Temperature::DEFAULT, &mut rng), 0);
    }
}

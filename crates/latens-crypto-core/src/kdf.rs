//! Password-based key derivation and timing calibration.
//!
//! Two KDFs are exposed:
//! - [`pbkdf2_derive`] — PBKDF2-HMAC-SHA256, used to wrap keyslot envelopes at a
//!   fixed iteration count ([`KEYSLOT_PBKDF2_ITERATIONS`]).
//! - [`scrypt_derive`] — scrypt, used by the single-keyslot masterkey blob where
//!   the caller supplies a tunable work factor.
//!
//! [`calibrate`] fits a linear model of PBKDF2 runtime against iteration count
//! so callers can translate a desired latency into an iteration count (or vice
//! versa) without running a derivation up front.

use crate::error::CryptoError;
use crate::memory::SecretBytes;
use pbkdf2::pbkdf2_hmac;
use scrypt::Params as ScryptParams;
use sha2::Sha256;
use std::sync::OnceLock;
use std::time::Instant;

/// Output length of both KDFs in bytes (256-bit key).
pub const OUTPUT_LEN: usize = 32;

/// Fixed iteration count used to wrap a keyslot envelope.
pub const KEYSLOT_PBKDF2_ITERATIONS: u32 = 100_000;

/// Calibration points (iteration counts) at which PBKDF2 runtime is measured.
const CALIBRATION_POINTS: [u64; 4] = [5_000, 50_000, 250_000, 1_000_000];

/// Number of timed repetitions per calibration point; the median is kept.
const REPETITIONS: usize = 3;

/// Derive a 256-bit key via PBKDF2-HMAC-SHA256.
///
/// # Errors
///
/// Returns `CryptoError::KeyDerivation` if `iterations` is zero.
pub fn pbkdf2_derive(
    password: &[u8],
    salt: &[u8],
    iterations: u32,
) -> Result<SecretBytes<OUTPUT_LEN>, CryptoError> {
    if iterations == 0 {
        return Err(CryptoError::KeyDerivation(
            "iteration count must be at least 1".into(),
        ));
    }
    let mut out = [0u8; OUTPUT_LEN];
    pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut out);
    Ok(SecretBytes::new(out))
}

/// Derive a 256-bit key via scrypt, at the given work factor.
///
/// `work_factor` is scrypt's `log2(N)` cost parameter; `r = 8` and `p = 1` are
/// fixed, matching common scrypt deployments. Valid range is `1..=24`.
///
/// # Errors
///
/// Returns `CryptoError::KeyDerivation` if `work_factor` is out of range or the
/// underlying scrypt parameters are rejected.
pub fn scrypt_derive(
    password: &[u8],
    salt: &[u8],
    work_factor: u8,
) -> Result<SecretBytes<OUTPUT_LEN>, CryptoError> {
    if !(1..=24).contains(&work_factor) {
        return Err(CryptoError::KeyDerivation(format!(
            "work factor {work_factor} out of range (expected 1..=24)"
        )));
    }
    let params = ScryptParams::new(work_factor, 8, 1, OUTPUT_LEN)
        .map_err(|e| CryptoError::KeyDerivation(format!("invalid scrypt parameters: {e}")))?;
    let mut out = [0u8; OUTPUT_LEN];
    scrypt::scrypt(password, salt, &params, &mut out)
        .map_err(|e| CryptoError::KeyDerivation(format!("scrypt derivation failed: {e}")))?;
    Ok(SecretBytes::new(out))
}

// ---------------------------------------------------------------------------
// Timing calibration (C1)
// ---------------------------------------------------------------------------

/// A fitted linear model `T(n) = alpha + beta * n`, milliseconds as a function
/// of iteration count.
#[derive(Debug, Clone, Copy)]
pub struct CalibrationModel {
    alpha: f64,
    beta: f64,
}

impl CalibrationModel {
    /// Predict runtime in milliseconds for `iterations` PBKDF2-HMAC-SHA256 rounds.
    #[must_use]
    pub fn predict(&self, iterations: u64) -> u64 {
        #[allow(clippy::cast_precision_loss)]
        let n = iterations as f64;
        let estimate = self.alpha + self.beta * n;
        if estimate <= 0.0 {
            0
        } else {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                estimate.round() as u64
            }
        }
    }

    /// Fitted intercept, for diagnostics.
    #[must_use]
    pub const fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Fitted slope (milliseconds per iteration), for diagnostics.
    #[must_use]
    pub const fn beta(&self) -> f64 {
        self.beta
    }
}

/// Descriptive security-level label derived from an iteration count.
#[must_use]
pub fn security_level(iterations: u64) -> &'static str {
    if iterations < 50_000 {
        "Low"
    } else if iterations < 100_000 {
        "Standard"
    } else if iterations < 500_000 {
        "High"
    } else if iterations < 1_000_000 {
        "Very High"
    } else {
        "Maximum"
    }
}

/// Reference attacker throughput used for the brute-force estimate: a single
/// consumer GPU doing PBKDF2-HMAC-SHA256 guesses against a 52.56-bit-entropy
/// reference password.
const ATTACKER_GUESSES_PER_SECOND: f64 = 100_000.0;
const REFERENCE_PASSWORD_ENTROPY_BITS: f64 = 52.56;

/// Human-readable worst-case brute-force time against the reference password,
/// given the per-guess cost implied by `iterations` PBKDF2 rounds.
#[must_use]
pub fn brute_force_time_estimate(iterations: u64, model: &CalibrationModel) -> String {
    let ms_per_guess = model.predict(iterations).max(1) as f64;
    let keyspace = REFERENCE_PASSWORD_ENTROPY_BITS.exp2();
    let guesses_per_second_at_cost = (ATTACKER_GUESSES_PER_SECOND * 1000.0 / ms_per_guess.max(1.0))
        .min(ATTACKER_GUESSES_PER_SECOND);
    let seconds = keyspace / guesses_per_second_at_cost.max(1e-9);

    const MINUTE: f64 = 60.0;
    const HOUR: f64 = MINUTE * 60.0;
    const DAY: f64 = HOUR * 24.0;
    const YEAR: f64 = DAY * 365.25;
    const CENTURY: f64 = YEAR * 100.0;

    if seconds >= CENTURY {
        "centuries".to_string()
    } else if seconds >= YEAR {
        format!("{:.1} years", seconds / YEAR)
    } else if seconds >= DAY {
        format!("{:.1} days", seconds / DAY)
    } else if seconds >= HOUR {
        format!("{:.1} hours", seconds / HOUR)
    } else if seconds >= MINUTE {
        format!("{:.1} minutes", seconds / MINUTE)
    } else {
        format!("{seconds:.1} seconds")
    }
}

/// Process-wide lazily-computed calibration model.
static CALIBRATION_CACHE: OnceLock<CalibrationModel> = OnceLock::new();

/// Run (or return the cached) OLS calibration of PBKDF2-HMAC-SHA256 runtime.
///
/// The first call on a process performs a warm-up derivation followed by
/// [`REPETITIONS`] timed derivations at each of [`CALIBRATION_POINTS`], keeping
/// the median per point, then fits `T(n) = alpha + beta*n` by ordinary least
/// squares. Subsequent calls return the cached model; [`force_recalibrate`]
/// bypasses the cache (without replacing it — the cache is one-shot per process).
///
/// # Errors
///
/// Returns `CryptoError::KeyDerivation` if measurement fails.
pub fn calibrate() -> Result<CalibrationModel, CryptoError> {
    if let Some(model) = CALIBRATION_CACHE.get() {
        return Ok(*model);
    }
    let model = measure_model()?;
    Ok(*CALIBRATION_CACHE.get_or_init(|| model))
}

/// Force a fresh measurement, bypassing the cache.
///
/// # Errors
///
/// See [`calibrate`].
pub fn force_recalibrate() -> Result<CalibrationModel, CryptoError> {
    measure_model()
}

fn measure_model() -> Result<CalibrationModel, CryptoError> {
    let salt = [0x42u8; 16];
    let password = b"calibration-probe";

    // Warm-up pass: let codegen caches and CPU frequency scaling settle before
    // any timed measurement.
    let _ = pbkdf2_derive(password, &salt, 1_000)?;

    let mut xs = [0.0f64; CALIBRATION_POINTS.len()];
    let mut ys = [0.0f64; CALIBRATION_POINTS.len()];

    for (i, &n) in CALIBRATION_POINTS.iter().enumerate() {
        let mut samples = [0.0f64; REPETITIONS];
        for sample in &mut samples {
            #[allow(clippy::cast_possible_truncation)]
            let iterations = n as u32;
            let started = Instant::now();
            let _ = pbkdf2_derive(password, &salt, iterations)?;
            *sample = started.elapsed().as_secs_f64() * 1000.0;
        }
        samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        #[allow(clippy::cast_precision_loss)]
        {
            xs[i] = n as f64;
        }
        ys[i] = samples[REPETITIONS / 2];
    }

    Ok(ordinary_least_squares(&xs, &ys))
}

/// Closed-form two-variable OLS fit of `y = alpha + beta * x`.
fn ordinary_least_squares(xs: &[f64], ys: &[f64]) -> CalibrationModel {
    #[allow(clippy::cast_precision_loss)]
    let count = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / count;
    let mean_y = ys.iter().sum::<f64>() / count;

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (&x, &y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        numerator += dx * (y - mean_y);
        denominator += dx * dx;
    }

    let beta = if denominator.abs() < f64::EPSILON {
        0.0
    } else {
        numerator / denominator
    };
    let alpha = mean_y - beta * mean_x;

    CalibrationModel { alpha, beta }
}

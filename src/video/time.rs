use std::cmp::Ordering;
use std::fmt;

/// Microsecond grid used when a fractional duration is handed in as `f64`.
const FRACTIONAL_TIMESCALE: u64 = 1_000_000;

/// Exact rational media time: `value / timescale` seconds.
///
/// Comparison is by value, so `5/1` equals `10/2`.
#[derive(Debug, Clone, Copy)]
pub struct MediaTime {
    value: i64,
    timescale: u64,
}

impl MediaTime {
    pub const ZERO: MediaTime = MediaTime { value: 0, timescale: 1 };

    /// Create a media time. Panics if `timescale` is zero.
    pub const fn new(value: i64, timescale: u64) -> Self {
        assert!(timescale > 0, "media time timescale must be non-zero");
        Self { value, timescale }
    }

    pub const fn from_secs(secs: u32) -> Self {
        Self {
            value: secs as i64,
            timescale: 1,
        }
    }

    /// Quantize fractional seconds to microseconds.
    ///
    /// Returns `None` for NaN, infinities and values that do not fit.
    pub fn from_secs_f64(secs: f64) -> Option<Self> {
        if !secs.is_finite() {
            return None;
        }
        let micros = (secs * FRACTIONAL_TIMESCALE as f64).round();
        if micros.abs() > i64::MAX as f64 {
            return None;
        }
        Some(Self::new(micros as i64, FRACTIONAL_TIMESCALE).reduced())
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    pub fn timescale(&self) -> u64 {
        self.timescale
    }

    pub fn is_positive(&self) -> bool {
        self.value > 0
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.value as f64 / self.timescale as f64
    }

    /// Same instant with numerator and timescale divided by their gcd
    pub fn reduced(&self) -> Self {
        let divisor = gcd(self.value.unsigned_abs(), self.timescale);
        if divisor <= 1 {
            return *self;
        }
        Self {
            value: self.value / divisor as i64,
            timescale: self.timescale / divisor,
        }
    }

    /// Multiply by an integer factor without changing the timescale
    pub fn checked_mul(&self, factor: u64) -> Option<Self> {
        let factor = i64::try_from(factor).ok()?;
        Some(Self {
            value: self.value.checked_mul(factor)?,
            timescale: self.timescale,
        })
    }

    /// Divide by an integer, widening the timescale so the result stays exact
    pub fn checked_div(&self, divisor: u64) -> Option<Self> {
        if divisor == 0 {
            return None;
        }
        let timescale = self.timescale.checked_mul(divisor)?;
        let divisor = gcd(self.value.unsigned_abs(), timescale).max(1);
        Some(Self {
            value: self.value / divisor as i64,
            timescale: timescale / divisor,
        })
    }

    /// Exact sum, expressed on the least common timescale
    pub fn checked_add(&self, other: MediaTime) -> Option<Self> {
        let a = self.timescale;
        let b = other.timescale;
        let timescale = (a / gcd(a, b)).checked_mul(b)?;
        let left = self.value.checked_mul(i64::try_from(timescale / a).ok()?)?;
        let right = other.value.checked_mul(i64::try_from(timescale / b).ok()?)?;
        let sum = Self {
            value: left.checked_add(right)?,
            timescale,
        };
        Some(sum.reduced())
    }

    /// Exact difference, `None` on overflow
    pub fn checked_sub(&self, other: MediaTime) -> Option<Self> {
        self.checked_add(MediaTime {
            value: other.value.checked_neg()?,
            timescale: other.timescale,
        })
    }

    /// Round to the nearest multiple of `1 / units_per_sec` seconds,
    /// returned as a count of those units. Halves round away from zero.
    pub fn round_to_units(&self, units_per_sec: u64) -> i128 {
        let scaled = self.value as i128 * units_per_sec as i128;
        let timescale = self.timescale as i128;
        let half = timescale / 2;
        if scaled >= 0 {
            (scaled + half) / timescale
        } else {
            (scaled - half) / timescale
        }
    }

    fn cross(&self, other: &MediaTime) -> (i128, i128) {
        (
            self.value as i128 * other.timescale as i128,
            other.value as i128 * self.timescale as i128,
        )
    }
}

impl Default for MediaTime {
    fn default() -> Self {
        Self::ZERO
    }
}

impl PartialEq for MediaTime {
    fn eq(&self, other: &Self) -> bool {
        let (left, right) = self.cross(other);
        left == right
    }
}

impl Eq for MediaTime {}

impl PartialOrd for MediaTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MediaTime {
    fn cmp(&self, other: &Self) -> Ordering {
        let (left, right) = self.cross(other);
        left.cmp(&right)
    }
}

impl fmt::Display for MediaTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reduced = self.reduced();
        write!(f, "{}/{}s", reduced.value, reduced.timescale)
    }
}

pub(crate) fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}

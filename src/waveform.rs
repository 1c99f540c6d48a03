//! Arbitrary waveform encoding.
//!
//! Upload pipeline:
//! 1. normalize the input into an (x, y) pair, synthesizing a uniform time
//!    axis when only samples are given
//! 2. validate length against the instrument's quantum and size limits
//! 3. compute the x increment (RMS of consecutive x differences)
//! 4. pick a handle absent from a freshly fetched catalog
//! 5. describe the payload with header commands
//! 6. quantize each sample to a 12-bit code, packed big-endian in 2 bytes
//!
//! Fetching the catalog and writing the block need the instrument and live
//! in the driver. Everything here is pure.

use crate::error::{IviError, IviResult};
use crate::instrument::codec::scientific;
use serde::{Deserialize, Serialize};

/// Sample spacing used when no x axis is given (10 MS/s).
pub const DEFAULT_SAMPLE_SPACING: f64 = 1.0 / 10e6;

/// Command prefix of the binary block carrying the samples.
pub const CURVE_PREFIX: &str = ":curve ";

const BITS: u32 = 12;
/// Top code (`2^12 - 1`) is never produced.
const FULL_SCALE: f64 = ((1u32 << BITS) - 2) as f64;
const TRANSPORT_MASK: u32 = 0x000f_ffff;

/// Samples to upload, with or without an explicit time axis.
#[derive(Debug, Clone, PartialEq)]
pub enum WaveformData {
    /// Amplitudes in -1.0..=1.0 at the default spacing.
    Samples(Vec<f64>),
    /// Amplitudes `y` sampled at times `x` (seconds). Both must be the same
    /// length.
    Signal {
        /// Sample times.
        x: Vec<f64>,
        /// Amplitudes.
        y: Vec<f64>,
    },
}

impl From<Vec<f64>> for WaveformData {
    fn from(samples: Vec<f64>) -> Self {
        WaveformData::Samples(samples)
    }
}

impl From<&[f64]> for WaveformData {
    fn from(samples: &[f64]) -> Self {
        WaveformData::Samples(samples.to_vec())
    }
}

impl From<(Vec<f64>, Vec<f64>)> for WaveformData {
    fn from((x, y): (Vec<f64>, Vec<f64>)) -> Self {
        WaveformData::Signal { x, y }
    }
}

impl WaveformData {
    /// Number of amplitude samples.
    pub fn len(&self) -> usize {
        match self {
            WaveformData::Samples(y) => y.len(),
            WaveformData::Signal { y, .. } => y.len(),
        }
    }

    /// `true` when there are no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Split into `(x, y)`, building `x` at [`DEFAULT_SAMPLE_SPACING`] when
    /// absent.
    fn into_axes(self) -> IviResult<(Vec<f64>, Vec<f64>)> {
        match self {
            WaveformData::Samples(y) => {
                let x = (0..y.len())
                    .map(|i| i as f64 * DEFAULT_SAMPLE_SPACING)
                    .collect();
                Ok((x, y))
            }
            WaveformData::Signal { x, y } if x.len() == y.len() => Ok((x, y)),
            WaveformData::Signal { x, y } => Err(IviError::UnsupportedValue(format!(
                "signal has {} x values but {} samples",
                x.len(),
                y.len()
            ))),
        }
    }
}

/// Length constraints of an instrument's waveform memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveformLimits {
    /// Lengths must be a multiple of this. 0 disables the check.
    pub quantum: usize,
    /// Reported only; shorter uploads are not rejected.
    pub size_min: usize,
    /// Longest accepted upload.
    pub size_max: usize,
    /// Waveforms the instrument can hold at once.
    pub number_waveforms_max: usize,
}

impl WaveformLimits {
    /// Validate a sample count.
    ///
    /// # Errors
    ///
    /// [`IviError::UnsupportedValue`] for an empty waveform, a length off the
    /// quantum, or one above `size_max`.
    pub fn check(&self, len: usize) -> IviResult<()> {
        if len == 0 {
            return Err(IviError::UnsupportedValue("waveform has no samples".into()));
        }
        if self.quantum > 0 && len % self.quantum != 0 {
            return Err(IviError::UnsupportedValue(format!(
                "waveform length {} is not a multiple of {}",
                len, self.quantum
            )));
        }
        if len > self.size_max {
            return Err(IviError::UnsupportedValue(format!(
                "waveform length {} exceeds {}",
                len, self.size_max
            )));
        }
        Ok(())
    }
}

/// A validated waveform ready to be described and packed.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedWaveform {
    /// Amplitudes, not yet quantized.
    pub samples: Vec<f64>,
    /// Sample spacing in seconds, written as `:wfmpre:xincr`.
    pub x_increment: f64,
}

impl PreparedWaveform {
    /// Validate `data` against `limits` and derive the sample spacing.
    ///
    /// # Errors
    ///
    /// [`IviError::UnsupportedValue`] when the length check fails, when x and
    /// y differ in length, when a sample is NaN, or when the time axis holds
    /// an infinite or NaN value. Nothing is sent in any of these cases.
    pub fn new(data: WaveformData, limits: &WaveformLimits) -> IviResult<Self> {
        let (x, y) = data.into_axes()?;
        limits.check(y.len())?;
        if y.iter().any(|v| v.is_nan()) {
            return Err(IviError::UnsupportedValue("waveform contains NaN samples".into()));
        }
        // xincr goes into the header verbatim
        if x.iter().any(|v| !v.is_finite()) {
            return Err(IviError::UnsupportedValue(
                "waveform time axis contains non-finite values".into(),
            ));
        }
        Ok(Self {
            x_increment: x_increment(&x),
            samples: y,
        })
    }

    /// Block payload for the `:curve` command.
    pub fn pack(&self) -> Vec<u8> {
        pack(&self.samples)
    }
}

/// Root mean square of consecutive differences of `x`.
pub fn x_increment(x: &[f64]) -> f64 {
    if x.len() < 2 {
        return 0.0;
    }
    let sum: f64 = x.windows(2).map(|w| (w[1] - w[0]).powi(2)).sum();
    (sum / (x.len() - 1) as f64).sqrt()
}

/// 12-bit code for one sample. Inputs beyond ±1.0 saturate.
pub fn quantize(sample: f64) -> u16 {
    let clipped = sample.clamp(-1.0, 1.0);
    let unit = (clipped + 1.0) / 2.0;
    let code = (unit * FULL_SCALE + 0.5) as u32 & TRANSPORT_MASK;
    code as u16
}

/// Quantize every sample and pack MSB first.
pub fn pack(samples: &[f64]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&sample| quantize(sample).to_be_bytes())
        .collect()
}

/// Commands describing the binary payload that follows.
pub fn header_commands(handle: &str, x_increment: f64) -> Vec<String> {
    vec![
        format!(":data:destination \"{}\"", handle),
        format!(":wfmpre:bit_nr {}", BITS),
        ":wfmpre:bn_fmt rp".to_string(),
        ":wfmpre:byt_nr 2".to_string(),
        ":wfmpre:byt_or msb".to_string(),
        ":wfmpre:encdg bin".to_string(),
        ":wfmpre:pt_fmt y".to_string(),
        ":wfmpre:yzero 0".to_string(),
        format!(":wfmpre:ymult {}", scientific(2.0 / f64::from(1u32 << BITS))),
        format!(":wfmpre:xincr {}", scientific(x_increment)),
    ]
}

/// One stored item as listed by the instrument, lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Handle, e.g. `w0003.wfm`.
    pub name: String,
    /// File type field.
    pub kind: String,
    /// Size field, kept as the instrument formats it.
    pub size: String,
}

/// Snapshot of the instrument's stored waveforms. Never kept between
/// operations since storage can change behind the driver's back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// Parse a catalog reply: a leading summary field, then
    /// `"name","type","size"` triples, all comma separated.
    pub fn parse(reply: &str) -> Self {
        let lowered = reply.trim().to_lowercase();
        let Some((_, listing)) = lowered.split_once(',') else {
            return Self::default();
        };
        let fields: Vec<&str> = listing.split(',').map(|f| f.trim().trim_matches('"')).collect();
        let entries = fields
            .chunks(3)
            .filter(|chunk| !chunk[0].is_empty())
            .map(|chunk| CatalogEntry {
                name: chunk[0].to_string(),
                kind: chunk.get(1).copied().unwrap_or_default().to_string(),
                size: chunk.get(2).copied().unwrap_or_default().to_string(),
            })
            .collect();
        Self { entries }
    }

    /// A catalog holding only `names`, used while simulating.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries = names
            .into_iter()
            .map(|name| CatalogEntry {
                name: name.into(),
                kind: "wfm".to_string(),
                size: String::new(),
            })
            .collect();
        Self { entries }
    }

    /// All entries in listing order.
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Entry names in listing order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Exact match against the lowercased names.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` for an empty listing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-session waveform name counter.
#[derive(Debug, Clone, Default)]
pub struct HandleAllocator {
    counter: u32,
}

impl HandleAllocator {
    /// Counter starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Next `wNNNN.wfm` absent from `catalog`. The counter only moves
    /// forward, so names taken earlier in the session are never offered
    /// again.
    pub fn allocate(&mut self, catalog: &Catalog) -> String {
        loop {
            self.counter += 1;
            let handle = format!("w{:04}.wfm", self.counter);
            if !catalog.contains(&handle) {
                return handle;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> WaveformLimits {
        WaveformLimits {
            quantum: 8,
            size_min: 64,
            size_max: 256 * 1024,
            number_waveforms_max: 0,
        }
    }

    #[test]
    fn test_quantize_endpoints() {
        assert_eq!(quantize(1.0), 4094);
        assert_eq!(quantize(-1.0), 0);
        assert_eq!(quantize(0.0), 2047);
    }

    #[test]
    fn test_quantize_saturates() {
        assert_eq!(quantize(1.5), quantize(1.0));
        assert_eq!(quantize(-7.0), quantize(-1.0));
        assert_eq!(quantize(f64::INFINITY), 4094);
    }

    #[test]
    fn test_pack_is_big_endian() {
        assert_eq!(pack(&[1.0, -1.0, 0.0]), vec![0x0f, 0xfe, 0x00, 0x00, 0x07, 0xff]);
    }

    #[test]
    fn test_quantum_check() {
        let ten = WaveformData::from(vec![0.0; 10]);
        assert!(matches!(
            PreparedWaveform::new(ten, &limits()),
            Err(IviError::UnsupportedValue(_))
        ));
        let sixteen = WaveformData::from(vec![0.0; 16]);
        assert!(PreparedWaveform::new(sixteen, &limits()).is_ok());
    }

    #[test]
    fn test_empty_oversized_and_nan_rejected() {
        assert!(PreparedWaveform::new(WaveformData::from(Vec::new()), &limits()).is_err());
        let too_long = WaveformData::from(vec![0.0; 256 * 1024 + 8]);
        assert!(PreparedWaveform::new(too_long, &limits()).is_err());
        let mut samples = vec![0.0; 8];
        samples[3] = f64::NAN;
        assert!(PreparedWaveform::new(WaveformData::from(samples), &limits()).is_err());
    }

    #[test]
    fn test_non_finite_time_axis_rejected() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let mut x: Vec<f64> = (0..8).map(|i| i as f64 * 1e-6).collect();
            x[5] = bad;
            let data = WaveformData::from((x, vec![0.0; 8]));
            assert!(matches!(
                PreparedWaveform::new(data, &limits()),
                Err(IviError::UnsupportedValue(_))
            ));
        }
    }

    #[test]
    fn test_short_waveform_accepted() {
        // Below size_min but a quantum multiple
        assert!(PreparedWaveform::new(WaveformData::from(vec![0.5; 8]), &limits()).is_ok());
    }

    #[test]
    fn test_signal_axes_must_match() {
        let data = WaveformData::from((vec![0.0, 1.0], vec![0.0; 8]));
        assert!(matches!(
            PreparedWaveform::new(data, &limits()),
            Err(IviError::UnsupportedValue(_))
        ));
    }

    #[test]
    fn test_x_increment() {
        let prepared = PreparedWaveform::new(WaveformData::from(vec![0.0; 8]), &limits()).unwrap();
        assert!((prepared.x_increment - DEFAULT_SAMPLE_SPACING).abs() < 1e-18);

        let x = vec![0.0, 1.0, 3.0];
        // sqrt((1 + 4) / 2)
        assert!((x_increment(&x) - 2.5f64.sqrt()).abs() < 1e-12);
        assert_eq!(x_increment(&[1.0]), 0.0);
    }

    #[test]
    fn test_header_commands() {
        let header = header_commands("w0001.wfm", 1e-7);
        assert_eq!(header.len(), 10);
        assert_eq!(header[0], ":data:destination \"w0001.wfm\"");
        assert_eq!(header[1], ":wfmpre:bit_nr 12");
        assert_eq!(header[4], ":wfmpre:byt_or msb");
        assert!(header[8].starts_with(":wfmpre:ymult 4.88281"));
        assert_eq!(header[9], ":wfmpre:xincr 1.000000e-07");
    }

    #[test]
    fn test_catalog_parse() {
        let catalog =
            Catalog::parse("1024,\"W0001.WFM\",\"WFM\",\"2048\",\"SETUP.STA\",\"STA\",\"512\"");
        assert_eq!(catalog.len(), 2);
        assert!(catalog.contains("w0001.wfm"));
        assert_eq!(catalog.entries()[1].kind, "sta");
        assert!(Catalog::parse("0").is_empty());
    }

    #[test]
    fn test_allocator_skips_existing() {
        let catalog = Catalog::from_names(["w0001.wfm", "w0002.wfm"]);
        let mut allocator = HandleAllocator::new();
        let handle = allocator.allocate(&catalog);
        assert_eq!(handle, "w0003.wfm");
        assert!(!catalog.contains(&handle));
        assert_eq!(allocator.allocate(&Catalog::default()), "w0004.wfm");
    }
}

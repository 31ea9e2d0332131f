use std::borrow::Cow;

use crate::error::{MetricError, MetricResult};

// maximum length of instrument name
const INSTRUMENT_NAME_MAX_LENGTH: usize = 255;
// maximum length of instrument unit name
const INSTRUMENT_UNIT_NAME_MAX_LENGTH: usize = 63;
const INSTRUMENT_NAME_ALLOWED_NON_ALPHANUMERIC_CHARS: [char; 4] = ['_', '.', '-', '/'];

// instrument validation error strings
const INSTRUMENT_NAME_EMPTY: &str = "instrument name must be non-empty";
const INSTRUMENT_NAME_LENGTH: &str = "instrument name must be less than 256 characters";
const INSTRUMENT_NAME_INVALID_CHAR: &str =
    "characters in instrument name must be ASCII and belong to the alphanumeric characters, '_', '.', '-' and '/'";
const INSTRUMENT_NAME_FIRST_ALPHABETIC: &str =
    "instrument name must start with an alphabetic character";
const INSTRUMENT_UNIT_LENGTH: &str = "instrument unit must be less than 64 characters";
const INSTRUMENT_UNIT_INVALID_CHAR: &str = "characters in instrument unit must be ASCII";

/// The identifier of a group of instruments that all perform the same function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InstrumentKind {
    /// Identifies a group of instruments that record increasing values
    /// synchronously with the code path they are measuring.
    Counter,
    /// A group of instruments that record increasing and decreasing values
    /// synchronously with the code path they are measuring.
    UpDownCounter,
    /// A group of instruments that record a distribution of values
    /// synchronously with the code path they are measuring.
    Histogram,
    /// A group of instruments that record increasing values in an asynchronous
    /// callback. Observations are running totals.
    ObservableCounter,
    /// A group of instruments that record increasing and decreasing values in
    /// an asynchronous callback. Observations are running totals.
    ObservableUpDownCounter,
    /// A group of instruments that record current values in an asynchronous
    /// callback.
    ObservableGauge,
}

impl InstrumentKind {
    /// Whether measurements arrive synchronously with the measured code path.
    pub fn synchronous(&self) -> bool {
        matches!(
            self,
            InstrumentKind::Counter | InstrumentKind::UpDownCounter | InstrumentKind::Histogram
        )
    }

    /// Whether measurements are produced by a collection-time callback.
    pub fn asynchronous(&self) -> bool {
        !self.synchronous()
    }

    /// Whether this kind of instrument adds its inputs (as opposed to grouping).
    pub fn adding(&self) -> bool {
        matches!(
            self,
            InstrumentKind::Counter
                | InstrumentKind::UpDownCounter
                | InstrumentKind::ObservableCounter
                | InstrumentKind::ObservableUpDownCounter
        )
    }

    /// Whether this kind of instrument exposes a non-decreasing sum.
    pub fn monotonic(&self) -> bool {
        matches!(
            self,
            InstrumentKind::Counter | InstrumentKind::ObservableCounter
        )
    }

    /// Whether this kind of instrument receives precomputed sums.
    pub fn precomputed_sum(&self) -> bool {
        self.adding() && self.asynchronous()
    }
}

/// The numeric type an instrument is declared over.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum NumberKind {
    /// Signed 64-bit integers.
    #[default]
    I64,
    /// Unsigned 64-bit integers.
    U64,
    /// 64-bit floating point numbers.
    F64,
}

/// Describes an instrument: its name, kind, unit and description.
///
/// The number kind is filled in when the instrument is registered, from the
/// type of the recorder it is registered for.
#[derive(Clone, Debug, PartialEq)]
pub struct Descriptor {
    name: Cow<'static, str>,
    kind: InstrumentKind,
    number_kind: NumberKind,
    unit: Cow<'static, str>,
    description: Cow<'static, str>,
}

impl Descriptor {
    /// Create a new descriptor with an empty unit and description.
    pub fn new(name: impl Into<Cow<'static, str>>, kind: InstrumentKind) -> Self {
        Descriptor {
            name: name.into(),
            kind,
            number_kind: NumberKind::default(),
            unit: Cow::Borrowed(""),
            description: Cow::Borrowed(""),
        }
    }

    /// Sets the unit of measure.
    pub fn with_unit(mut self, unit: impl Into<Cow<'static, str>>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Sets the human-readable description.
    pub fn with_description(mut self, description: impl Into<Cow<'static, str>>) -> Self {
        self.description = description.into();
        self
    }

    pub(crate) fn with_number_kind(mut self, number_kind: NumberKind) -> Self {
        self.number_kind = number_kind;
        self
    }

    /// The instrument's name.
    pub fn name(&self) -> &str {
        self.name.as_ref()
    }

    /// The specific kind of instrument.
    pub fn kind(&self) -> InstrumentKind {
        self.kind
    }

    /// Whether this instrument is declared over `i64`, `u64` or `f64` values.
    pub fn number_kind(&self) -> NumberKind {
        self.number_kind
    }

    /// The unit the instrument reports in.
    pub fn unit(&self) -> &str {
        self.unit.as_ref()
    }

    /// A human-readable description of the instrument.
    pub fn description(&self) -> &str {
        self.description.as_ref()
    }

    /// Two descriptors name the same instrument when name, kind and number
    /// kind agree; unit and description may differ between registrations.
    pub(crate) fn same_identity(&self, other: &Descriptor) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
            && self.kind == other.kind
            && self.number_kind == other.number_kind
    }

    /// Keeps the longer of the current and the offered description.
    pub(crate) fn merge_description(&mut self, description: &str) {
        if description.len() > self.description.len() {
            self.description = Cow::Owned(description.to_owned());
        }
    }

    pub(crate) fn validate(&self) -> MetricResult<()> {
        validate_instrument_name(&self.name).and_then(|_| validate_instrument_unit(&self.unit))
    }
}

fn validate_instrument_name(name: &str) -> MetricResult<()> {
    if name.is_empty() {
        return Err(MetricError::InvalidInstrumentConfiguration(
            INSTRUMENT_NAME_EMPTY,
        ));
    }
    if name.len() > INSTRUMENT_NAME_MAX_LENGTH {
        return Err(MetricError::InvalidInstrumentConfiguration(
            INSTRUMENT_NAME_LENGTH,
        ));
    }
    if name.starts_with(|c: char| !c.is_ascii_alphabetic()) {
        return Err(MetricError::InvalidInstrumentConfiguration(
            INSTRUMENT_NAME_FIRST_ALPHABETIC,
        ));
    }
    if name.contains(|c: char| {
        !c.is_ascii_alphanumeric() && !INSTRUMENT_NAME_ALLOWED_NON_ALPHANUMERIC_CHARS.contains(&c)
    }) {
        return Err(MetricError::InvalidInstrumentConfiguration(
            INSTRUMENT_NAME_INVALID_CHAR,
        ));
    }
    Ok(())
}

fn validate_instrument_unit(unit: &str) -> MetricResult<()> {
    if unit.len() > INSTRUMENT_UNIT_NAME_MAX_LENGTH {
        return Err(MetricError::InvalidInstrumentConfiguration(
            INSTRUMENT_UNIT_LENGTH,
        ));
    }
    if unit.contains(|c: char| !c.is_ascii()) {
        return Err(MetricError::InvalidInstrumentConfiguration(
            INSTRUMENT_UNIT_INVALID_CHAR,
        ));
    }
    Ok(())
}

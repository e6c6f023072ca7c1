use std::ops::Neg;

/// Metric type.
///
/// Only the minimal gauge/counter vocabulary of the protocol is supported.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricType {
    /// An absolute, instantaneous value.
    Gauge,

    /// A delta to be accumulated by the server.
    Counter,
}

impl MetricType {
    fn as_str(self) -> &'static str {
        match self {
            MetricType::Gauge => "|g",
            MetricType::Counter => "|c",
        }
    }
}

/// A numeric metric value.
///
/// Integers and floating-point values are kept apart so that each can be written in its canonical form: integers
/// without a fractional part (`1`, `-12`) and floating-point values in their shortest round-tripping representation
/// (`123.4`, `0.5`, `23.0`).
///
/// Non-finite floating-point values are written as-is (`NaN`, `inf`, `-inf`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MetricValue {
    /// An integer value.
    ///
    /// Stored as `i128` so that any 64-bit signed or unsigned integer can be negated without overflow. Negating
    /// `i128::MIN` itself produces the equivalent floating-point value.
    Integer(i128),

    /// A floating-point value.
    FloatingPoint(f64),
}

impl Neg for MetricValue {
    type Output = MetricValue;

    fn neg(self) -> Self::Output {
        match self {
            MetricValue::Integer(v) => match v.checked_neg() {
                Some(negated) => MetricValue::Integer(negated),
                None => MetricValue::FloatingPoint(-(v as f64)),
            },
            MetricValue::FloatingPoint(v) => MetricValue::FloatingPoint(-v),
        }
    }
}

macro_rules! impl_from_integer {
    ($($ty:ty),+) => {
        $(
            impl From<$ty> for MetricValue {
                fn from(v: $ty) -> Self {
                    MetricValue::Integer(i128::from(v))
                }
            }
        )+
    };
}

impl_from_integer!(i8, i16, i32, i64, u8, u16, u32, u64);

impl From<isize> for MetricValue {
    fn from(v: isize) -> Self {
        MetricValue::Integer(v as i128)
    }
}

impl From<usize> for MetricValue {
    fn from(v: usize) -> Self {
        MetricValue::Integer(v as i128)
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::FloatingPoint(v)
    }
}

struct MetricValueFormatter {
    int_writer: itoa::Buffer,
    float_writer: ryu::Buffer,
}

impl MetricValueFormatter {
    fn new() -> Self {
        Self { int_writer: itoa::Buffer::new(), float_writer: ryu::Buffer::new() }
    }

    fn format(&mut self, value: MetricValue) -> &str {
        match value {
            MetricValue::Integer(v) => self.int_writer.format(v),
            MetricValue::FloatingPoint(v) => self.float_writer.format(v),
        }
    }
}

/// A single metric sample, ready to be encoded.
///
/// Encoding produces one line of the form `name:value|type[|@sample_rate][|#tag1,tag2,...]`. The encoder performs no
/// validation: tags and names are written verbatim, so callers must not embed the reserved separators (`:`, `|`, `,`,
/// `#`, `@`, or a newline) in them.
#[derive(Clone, Copy, Debug)]
pub struct Metric<'a> {
    name: &'a str,
    value: MetricValue,
    metric_type: MetricType,
    tags: &'a [&'a str],
    sample_rate: f64,
}

impl<'a> Metric<'a> {
    /// Creates a new `Metric` with no tags and a sample rate of 1.
    pub fn new<V>(name: &'a str, value: V, metric_type: MetricType) -> Self
    where
        V: Into<MetricValue>,
    {
        Metric { name, value: value.into(), metric_type, tags: &[], sample_rate: 1.0 }
    }

    /// Sets the per-call tags for this metric.
    ///
    /// These are always written before any constant tags.
    #[must_use]
    pub fn with_tags(mut self, tags: &'a [&'a str]) -> Self {
        self.tags = tags;
        self
    }

    /// Sets the sample rate for this metric.
    #[must_use]
    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Returns the metric name.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Returns the metric value.
    pub fn value(&self) -> MetricValue {
        self.value
    }

    /// Returns the metric type.
    pub fn metric_type(&self) -> MetricType {
        self.metric_type
    }

    /// Returns the sample rate.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Encodes the metric into its wire representation, appending `constant_tags` after the per-call tags.
    ///
    /// Encoding is deterministic: the same metric and constant tags always produce the same line.
    pub fn encode<S>(&self, constant_tags: &[S]) -> String
    where
        S: AsRef<str>,
    {
        let mut buf = String::with_capacity(self.name.len() + 32);
        self.write_to(&mut buf, constant_tags);
        buf
    }

    #[allow(clippy::float_cmp)]
    fn write_to<S>(&self, buf: &mut String, constant_tags: &[S])
    where
        S: AsRef<str>,
    {
        let mut formatter = MetricValueFormatter::new();

        buf.push_str(self.name);
        buf.push(':');
        buf.push_str(formatter.format(self.value));
        buf.push_str(self.metric_type.as_str());

        // A sample rate of exactly 1 is the implied default and is never written.
        if self.sample_rate != 1.0 {
            let mut float_writer = ryu::Buffer::new();
            buf.push_str("|@");
            buf.push_str(float_writer.format(self.sample_rate));
        }

        let tags = self.tags.iter().copied().chain(constant_tags.iter().map(AsRef::as_ref));
        let mut wrote_tag = false;
        for tag in tags {
            if wrote_tag {
                buf.push(',');
            } else {
                buf.push_str("|#");
                wrote_tag = true;
            }

            buf.push_str(tag);
        }
    }
}

//! Sample formats, stream parameters, and the format-tagged buffers
//! handed to stream callbacks

use cpal::Sample;

use crate::error::{Error, Result};

/// Numeric representation of one sample
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SampleFormat {
    /// Unsigned 8-bit integer, equilibrium at 128
    U8,
    /// Signed 8-bit integer
    I8,
    /// Signed 16-bit integer
    I16,
    /// Signed 32-bit integer
    I32,
    /// 32-bit float in -1.0..=1.0
    F32,
}

impl SampleFormat {
    /// Get all supported formats
    pub fn all() -> &'static [SampleFormat] {
        &[
            SampleFormat::U8,
            SampleFormat::I8,
            SampleFormat::I16,
            SampleFormat::I32,
            SampleFormat::F32,
        ]
    }

    /// Size of one sample in bytes
    pub fn sample_size(&self) -> usize {
        match self {
            SampleFormat::U8 | SampleFormat::I8 => 1,
            SampleFormat::I16 => 2,
            SampleFormat::I32 | SampleFormat::F32 => 4,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SampleFormat::U8 => "u8",
            SampleFormat::I8 => "i8",
            SampleFormat::I16 => "i16",
            SampleFormat::I32 => "i32",
            SampleFormat::F32 => "f32",
        }
    }
}

impl SampleFormat {
    /// Stream format for a device format, `None` if streams can't carry it
    pub fn from_cpal(format: cpal::SampleFormat) -> Option<SampleFormat> {
        SampleFormat::all()
            .iter()
            .copied()
            .find(|f| cpal::SampleFormat::from(*f) == format)
    }
}

impl From<SampleFormat> for cpal::SampleFormat {
    fn from(format: SampleFormat) -> Self {
        match format {
            SampleFormat::U8 => cpal::SampleFormat::U8,
            SampleFormat::I8 => cpal::SampleFormat::I8,
            SampleFormat::I16 => cpal::SampleFormat::I16,
            SampleFormat::I32 => cpal::SampleFormat::I32,
            SampleFormat::F32 => cpal::SampleFormat::F32,
        }
    }
}

/// Parameters fixed when a stream is opened
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct StreamParameters {
    /// Number of input channels (0 for output-only streams)
    pub input_channels: u16,
    /// Number of output channels (0 for input-only streams)
    pub output_channels: u16,
    pub sample_format: SampleFormat,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Frames the callback fills per invocation
    pub frames_per_buffer: u32,
}

impl StreamParameters {
    /// Output-only parameters
    pub fn output(
        channels: u16,
        sample_format: SampleFormat,
        sample_rate: u32,
        frames_per_buffer: u32,
    ) -> Self {
        Self {
            input_channels: 0,
            output_channels: channels,
            sample_format,
            sample_rate,
            frames_per_buffer,
        }
    }

    /// Reject parameters no device could satisfy
    pub fn validate(&self) -> Result<()> {
        if self.input_channels == 0 && self.output_channels == 0 {
            return Err(Error::Device(
                "stream needs at least one input or output channel".to_string(),
            ));
        }
        if self.sample_rate == 0 {
            return Err(Error::Device("sample rate must be positive".to_string()));
        }
        if self.frames_per_buffer == 0 {
            return Err(Error::Device(
                "frames per buffer must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Samples in one output block (frames × output channels)
    pub fn output_block_len(&self) -> usize {
        self.frames_per_buffer as usize * self.output_channels as usize
    }

    /// Samples in one input block (frames × input channels)
    pub fn input_block_len(&self) -> usize {
        self.frames_per_buffer as usize * self.input_channels as usize
    }

    /// Wall-clock duration of one block in seconds
    pub fn block_period(&self) -> f64 {
        self.frames_per_buffer as f64 / self.sample_rate as f64
    }
}

/// Read-only interleaved samples in the stream's format
#[derive(Debug)]
pub enum Samples<'a> {
    U8(&'a [u8]),
    I8(&'a [i8]),
    I16(&'a [i16]),
    I32(&'a [i32]),
    F32(&'a [f32]),
}

/// Writable interleaved samples in the stream's format
#[derive(Debug)]
pub enum SamplesMut<'a> {
    U8(&'a mut [u8]),
    I8(&'a mut [i8]),
    I16(&'a mut [i16]),
    I32(&'a mut [i32]),
    F32(&'a mut [f32]),
}

impl Samples<'_> {
    pub fn len(&self) -> usize {
        match self {
            Samples::U8(s) => s.len(),
            Samples::I8(s) => s.len(),
            Samples::I16(s) => s.len(),
            Samples::I32(s) => s.len(),
            Samples::F32(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn format(&self) -> SampleFormat {
        match self {
            Samples::U8(_) => SampleFormat::U8,
            Samples::I8(_) => SampleFormat::I8,
            Samples::I16(_) => SampleFormat::I16,
            Samples::I32(_) => SampleFormat::I32,
            Samples::F32(_) => SampleFormat::F32,
        }
    }
}

impl SamplesMut<'_> {
    pub fn len(&self) -> usize {
        match self {
            SamplesMut::U8(s) => s.len(),
            SamplesMut::I8(s) => s.len(),
            SamplesMut::I16(s) => s.len(),
            SamplesMut::I32(s) => s.len(),
            SamplesMut::F32(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn format(&self) -> SampleFormat {
        match self {
            SamplesMut::U8(_) => SampleFormat::U8,
            SamplesMut::I8(_) => SampleFormat::I8,
            SamplesMut::I16(_) => SampleFormat::I16,
            SamplesMut::I32(_) => SampleFormat::I32,
            SamplesMut::F32(_) => SampleFormat::F32,
        }
    }

    /// Overwrite every sample with silence
    pub fn fill_equilibrium(&mut self) {
        match self {
            SamplesMut::U8(s) => s.fill(u8::EQUILIBRIUM),
            SamplesMut::I8(s) => s.fill(i8::EQUILIBRIUM),
            SamplesMut::I16(s) => s.fill(i16::EQUILIBRIUM),
            SamplesMut::I32(s) => s.fill(i32::EQUILIBRIUM),
            SamplesMut::F32(s) => s.fill(f32::EQUILIBRIUM),
        }
    }
}

/// A cpal sample type the engine can stream
pub trait StreamSample: cpal::SizedSample + Send + 'static {
    fn wrap(buf: &[Self]) -> Samples<'_>;

    fn wrap_mut(buf: &mut [Self]) -> SamplesMut<'_>;

    /// The typed slice inside `samples`, if it holds this format
    fn unwrap<'a>(samples: Samples<'a>) -> Option<&'a [Self]>;

    fn unwrap_mut<'a>(samples: SamplesMut<'a>) -> Option<&'a mut [Self]>;

    fn to_f32(self) -> f32;

    fn from_f32(value: f32) -> Self;

    /// Convert to another stream format through f32
    fn convert<D: StreamSample>(self) -> D {
        D::from_f32(self.to_f32())
    }
}

macro_rules! impl_stream_sample {
    ($ty:ty, $variant:ident) => {
        impl StreamSample for $ty {
            fn wrap(buf: &[Self]) -> Samples<'_> {
                Samples::$variant(buf)
            }

            fn wrap_mut(buf: &mut [Self]) -> SamplesMut<'_> {
                SamplesMut::$variant(buf)
            }

            fn unwrap<'a>(samples: Samples<'a>) -> Option<&'a [Self]> {
                match samples {
                    Samples::$variant(buf) => Some(buf),
                    _ => None,
                }
            }

            fn unwrap_mut<'a>(samples: SamplesMut<'a>) -> Option<&'a mut [Self]> {
                match samples {
                    SamplesMut::$variant(buf) => Some(buf),
                    _ => None,
                }
            }

            fn to_f32(self) -> f32 {
                f32::from_sample(self)
            }

            fn from_f32(value: f32) -> Self {
                <$ty as Sample>::from_sample(value)
            }
        }
    };
}

impl_stream_sample!(u8, U8);
impl_stream_sample!(i8, I8);
impl_stream_sample!(i16, I16);
impl_stream_sample!(i32, I32);
impl_stream_sample!(f32, F32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_sizes() {
        assert_eq!(SampleFormat::U8.sample_size(), 1);
        assert_eq!(SampleFormat::I16.sample_size(), 2);
        assert_eq!(SampleFormat::F32.sample_size(), 4);
    }

    #[test]
    fn test_validate_rejects_empty_stream() {
        let params = StreamParameters::output(0, SampleFormat::F32, 44100, 256);
        assert!(matches!(params.validate(), Err(Error::Device(_))));

        let params = StreamParameters::output(2, SampleFormat::F32, 44100, 0);
        assert!(params.validate().is_err());

        let params = StreamParameters::output(2, SampleFormat::F32, 44100, 256);
        assert!(params.validate().is_ok());
        assert_eq!(params.output_block_len(), 512);
    }

    #[test]
    fn test_every_format_maps_back_from_cpal() {
        for format in SampleFormat::all() {
            let device: cpal::SampleFormat = (*format).into();
            assert_eq!(SampleFormat::from_cpal(device), Some(*format));
        }
        assert_eq!(SampleFormat::from_cpal(cpal::SampleFormat::F64), None);
        assert_eq!(SampleFormat::from_cpal(cpal::SampleFormat::U16), None);
    }

    #[test]
    fn test_convert_between_formats() {
        assert_eq!(0i16.convert::<f32>(), 0.0);
        assert_eq!(i16::MIN.convert::<f32>(), -1.0);
        assert_eq!(128u8.convert::<f32>(), 0.0);
        assert_eq!(0u8.convert::<i16>(), i16::MIN);
        assert_eq!((-1.0f32).convert::<i16>(), i16::MIN);
        assert_eq!(0.5f32.convert::<i8>(), 64);
    }

    #[test]
    fn test_unwrap_only_matches_own_format() {
        let mut data = [1i16, 2];
        assert_eq!(i16::unwrap(Samples::I16(&data)), Some(&[1i16, 2][..]));
        assert!(f32::unwrap_mut(i16::wrap_mut(&mut data)).is_none());
        assert!(i16::unwrap_mut(i16::wrap_mut(&mut data)).is_some());
    }

    #[test]
    fn test_fill_equilibrium_u8_is_midpoint() {
        let mut data = [0u8; 4];
        let mut samples = u8::wrap_mut(&mut data);
        samples.fill_equilibrium();
        assert_eq!(samples.format(), SampleFormat::U8);
        assert_eq!(data, [128; 4]);
    }
}

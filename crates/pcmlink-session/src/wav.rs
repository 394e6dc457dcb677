use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use bytes::Bytes;
use hound::WavReader;
use pcmlink_frame::{encode_setup, AudioFormat, FrameError, OutputPort, StreamSource};
use tracing::{debug, info, warn};

use crate::error::Result;

/// Remembers the last eight header bytes hound consumed.
///
/// hound stops right after the data chunk header, so those bytes are the
/// `data` tag and its little-endian byte length.
struct HeaderTap<R> {
    inner: R,
    tail: [u8; 8],
}

impl<R> HeaderTap<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            tail: [0; 8],
        }
    }

    fn data_chunk_len(&self) -> Result<u64> {
        if &self.tail[..4] != b"data" {
            return Err(hound::Error::FormatError("data chunk header not found").into());
        }
        let len = u32::from_le_bytes([self.tail[4], self.tail[5], self.tail[6], self.tail[7]]);
        Ok(u64::from(len))
    }
}

impl<R: Read> Read for HeaderTap<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n >= self.tail.len() {
            self.tail.copy_from_slice(&buf[n - 8..n]);
        } else {
            self.tail.rotate_left(n);
            self.tail[8 - n..].copy_from_slice(&buf[..n]);
        }
        Ok(n)
    }
}

/// Raw PCM bytes of a WAV file, handed to the FPGA unmodified.
///
/// The data chunk size from the header bounds the stream: trailing bytes
/// after it are never sent, and a file that ends early just ends the stream.
pub struct PcmSource<R> {
    reader: R,
    format: AudioFormat,
    port: OutputPort,
    declared: u64,
    consumed: u64,
}

impl PcmSource<BufReader<File>> {
    /// Open a WAV file and position the source at the first PCM byte.
    pub fn open(path: impl AsRef<Path>, port: OutputPort) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::new(BufReader::new(file), port)
    }
}

impl<R: Read> PcmSource<R> {
    /// Parse the WAV header from `reader`.
    ///
    /// The stream length is the data chunk's byte size and the sample width
    /// is the container width, so padded formats (24 bits in 32-bit
    /// containers) are streamed whole.
    pub fn new(reader: R, port: OutputPort) -> Result<Self> {
        let wav = WavReader::new(HeaderTap::new(reader))?;
        let spec = wav.spec();
        let samples = wav.len();
        let tap = wav.into_inner();
        let declared = tap.data_chunk_len()?;

        let container_bits = match declared.checked_div(u64::from(samples)) {
            Some(bytes) if bytes > 0 => u16::try_from(bytes * 8)
                .map_err(|_| hound::Error::FormatError("sample container too wide"))?,
            _ => spec.bits_per_sample.div_ceil(8) * 8,
        };
        if container_bits != spec.bits_per_sample {
            debug!(
                valid_bits = spec.bits_per_sample,
                container_bits, "padded samples; using container width"
            );
        }
        let format = AudioFormat::new(spec.channels, container_bits, spec.sample_rate);

        info!(%format, declared_bytes = declared, port = port.get(), "opened wav input");
        Ok(Self {
            reader: tap.inner,
            format,
            port,
            declared,
            consumed: 0,
        })
    }

    pub fn format(&self) -> &AudioFormat {
        &self.format
    }

    pub fn port(&self) -> OutputPort {
        self.port
    }

    /// PCM bytes announced by the data chunk header.
    pub fn declared_bytes(&self) -> u64 {
        self.declared
    }

    pub fn consumed_bytes(&self) -> u64 {
        self.consumed
    }

    fn remaining(&self) -> u64 {
        self.declared - self.consumed
    }

    fn read_full(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(filled)
    }
}

impl<R: Read> StreamSource for PcmSource<R> {
    fn setup_payload(&mut self) -> pcmlink_frame::Result<Bytes> {
        let payload = encode_setup(&self.format, self.port)?;
        Ok(Bytes::copy_from_slice(&payload))
    }

    fn min_chunk(&self) -> usize {
        let remaining = usize::try_from(self.remaining()).unwrap_or(usize::MAX);
        self.format.block_align().min(remaining).max(1)
    }

    fn fill(&mut self, buf: &mut [u8]) -> pcmlink_frame::Result<usize> {
        let remaining = self.remaining();
        if remaining == 0 {
            return Ok(0);
        }

        let mut want = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        let block = self.format.block_align().max(1);
        if (want as u64) < remaining {
            want -= want % block;
        }
        if want == 0 {
            return Ok(0);
        }

        let n = self.read_full(&mut buf[..want]).map_err(FrameError::Source)?;
        self.consumed += n as u64;
        if n < want {
            warn!(
                consumed = self.consumed,
                declared = self.declared,
                "wav data ended before the declared size"
            );
            self.declared = self.consumed;
        }
        Ok(n)
    }
}

impl<R> std::fmt::Debug for PcmSource<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PcmSource")
            .field("format", &self.format)
            .field("port", &self.port)
            .field("declared", &self.declared)
            .field("consumed", &self.consumed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::error::SessionError;

    fn wav_bytes(channels: u16, bits: u16, rate: u32, samples: &[i32]) -> Vec<u8> {
        padded_wav_bytes(channels, bits, bits.div_ceil(8), rate, samples)
    }

    fn padded_wav_bytes(
        channels: u16,
        bits: u16,
        bytes_per_sample: u16,
        rate: u32,
        samples: &[i32],
    ) -> Vec<u8> {
        let spec_ex = hound::WavSpecEx {
            spec: hound::WavSpec {
                channels,
                sample_rate: rate,
                bits_per_sample: bits,
                sample_format: hound::SampleFormat::Int,
            },
            bytes_per_sample,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new_with_spec_ex(&mut cursor, spec_ex).unwrap();
            for &sample in samples {
                writer.write_sample(sample).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    fn drain(source: &mut PcmSource<Cursor<Vec<u8>>>, chunk: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; chunk];
        loop {
            let n = source.fill(&mut buf).unwrap();
            if n == 0 {
                return out;
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    #[test]
    fn reads_header_and_setup() {
        let bytes = wav_bytes(2, 16, 48_000, &[1, -1, 2, -2]);
        let mut source = PcmSource::new(Cursor::new(bytes), OutputPort::new(0).unwrap()).unwrap();

        assert_eq!(*source.format(), AudioFormat::new(2, 16, 48_000));
        assert_eq!(source.declared_bytes(), 8);
        assert_eq!(source.setup_payload().unwrap().as_ref(), &[0x11]);
    }

    #[test]
    fn streams_pcm_bytes_unmodified() {
        let samples: Vec<i32> = (0..40).map(|i| i * 300 - 6000).collect();
        let bytes = wav_bytes(2, 16, 44_100, &samples);
        let data_start = bytes.len() - samples.len() * 2;
        let expected = bytes[data_start..].to_vec();

        let mut source = PcmSource::new(Cursor::new(bytes), OutputPort::default()).unwrap();
        assert_eq!(drain(&mut source, 63), expected);
        assert_eq!(source.consumed_bytes(), 80);
    }

    #[test]
    fn fills_whole_sample_frames() {
        let samples: Vec<i32> = (0..30).collect();
        let bytes = wav_bytes(2, 24, 96_000, &samples);
        let mut source = PcmSource::new(Cursor::new(bytes), OutputPort::default()).unwrap();
        assert_eq!(source.min_chunk(), 6);

        let mut buf = [0u8; 63];
        assert_eq!(source.fill(&mut buf).unwrap(), 60);
        assert_eq!(source.fill(&mut buf).unwrap(), 30);
        assert_eq!(source.fill(&mut buf).unwrap(), 0);
    }

    #[test]
    fn padded_samples_stream_whole_containers() {
        let samples: Vec<i32> = (0..100).map(|i| i * 1000 - 50_000).collect();
        let bytes = padded_wav_bytes(2, 24, 4, 48_000, &samples);
        let expected = bytes[bytes.len() - 400..].to_vec();

        let mut source = PcmSource::new(Cursor::new(bytes), OutputPort::default()).unwrap();
        assert_eq!(source.declared_bytes(), 400);
        assert_eq!(*source.format(), AudioFormat::new(2, 32, 48_000));
        assert_eq!(source.min_chunk(), 8);
        assert_eq!(source.setup_payload().unwrap().as_ref(), &[0x13]);

        let mut buf = [0u8; 63];
        assert_eq!(source.fill(&mut buf).unwrap(), 56);
        let mut streamed = buf[..56].to_vec();
        streamed.extend(drain(&mut source, 63));
        assert_eq!(streamed, expected);
        assert_eq!(source.consumed_bytes(), 400);
    }

    #[test]
    fn stops_at_declared_size() {
        let mut bytes = wav_bytes(2, 16, 48_000, &[7, 7, 7, 7]);
        bytes.extend_from_slice(&[0xee; 16]);

        let mut source = PcmSource::new(Cursor::new(bytes), OutputPort::default()).unwrap();
        let out = drain(&mut source, 63);
        assert_eq!(out.len(), 8);
        assert!(!out.contains(&0xee));
    }

    #[test]
    fn early_eof_ends_stream() {
        let samples: Vec<i32> = (0..16).collect();
        let mut bytes = wav_bytes(2, 16, 48_000, &samples);
        bytes.truncate(bytes.len() - 10);

        let mut source = PcmSource::new(Cursor::new(bytes), OutputPort::default()).unwrap();
        let out = drain(&mut source, 16);
        assert_eq!(out.len(), 22);
        assert_eq!(source.declared_bytes(), 22);
    }

    #[test]
    fn unsupported_format_fails_at_setup() {
        let bytes = wav_bytes(1, 16, 48_000, &[1, 2]);
        let mut source = PcmSource::new(Cursor::new(bytes), OutputPort::default()).unwrap();
        assert!(matches!(
            source.setup_payload(),
            Err(FrameError::UnsupportedChannelCount(1))
        ));
    }

    #[test]
    fn garbage_is_a_wav_error() {
        let result = PcmSource::new(Cursor::new(b"not a wav file".to_vec()), OutputPort::default());
        assert!(matches!(result, Err(SessionError::Wav(_))));
    }
}

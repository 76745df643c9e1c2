use std::path::Path;

use crate::loom::{
    num::DataType,
    ops::{OpDesc, OpError, Operation},
    workspace::Workspace,
};

use super::ResourcePolicy;

/// Header of a binary Netpbm image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    width: usize,
    height: usize,
    channels: usize,
    /// Byte offset of the raster.
    offset: usize,
}

impl Header {
    fn parse(bytes: &[u8]) -> Result<Self, String> {
        let channels = match bytes.get(..2) {
            Some(b"P5") => 1,
            Some(b"P6") => 3,
            _ => return Err("expect a binary PGM (P5) or PPM (P6) image".into()),
        };

        let mut cursor = 2;
        let mut next = || -> Result<usize, String> {
            // skip whitespace and comments
            loop {
                match bytes.get(cursor) {
                    Some(x) if x.is_ascii_whitespace() => cursor += 1,
                    Some(b'#') => {
                        while bytes.get(cursor).is_some_and(|&x| x != b'\n') {
                            cursor += 1;
                        }
                    }
                    Some(_) => break,
                    None => return Err("unexpected end of header".into()),
                }
            }
            let start = cursor;
            while bytes.get(cursor).is_some_and(u8::is_ascii_digit) {
                cursor += 1;
            }
            std::str::from_utf8(&bytes[start..cursor])
                .ok()
                .and_then(|token| token.parse().ok())
                .ok_or_else(|| format!("invalid header field at byte {start}"))
        };

        let width = next()?;
        let height = next()?;
        let max = next()?;
        if !(1..=255).contains(&max) {
            return Err(format!("unsupported max value {max}"));
        }

        // exactly one whitespace byte separates the header from the raster
        match bytes.get(cursor) {
            Some(x) if x.is_ascii_whitespace() => Ok(Self {
                width,
                height,
                channels,
                offset: cursor + 1,
            }),
            _ => Err("missing raster".into()),
        }
    }

    #[inline]
    fn raster_size(&self) -> Option<usize> {
        self.width
            .checked_mul(self.height)?
            .checked_mul(self.channels)
    }
}

/// Loads a binary PGM/PPM image as a single precision tensor of shape `[height, width, channels]`,
/// first dimension fastest, holding the raw pixel values.
///
/// Like [`Load`](super::Load), an output that already exists is left untouched unless
/// [`LoadImage::force_reload`] is set. With [`ResourcePolicy::Warn`] an unusable image is skipped
/// and no tensor is created.
#[derive(Debug, Default, Clone)]
pub struct LoadImage {
    /// Decode the image again even if the output tensor is already in the workspace.
    pub force_reload: bool,
    /// What to do when the image is missing, unreadable or malformed.
    pub missing_resource: ResourcePolicy,
}

impl LoadImage {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn with_force_reload(mut self, force_reload: bool) -> Self {
        self.force_reload = force_reload;
        self
    }

    #[inline]
    pub fn with_missing_resource(mut self, policy: ResourcePolicy) -> Self {
        self.missing_resource = policy;
        self
    }

    fn decode(path: &Path) -> Result<(Header, Vec<f32>), OpError> {
        let bytes = std::fs::read(path).map_err(|source| OpError::Resource {
            path: path.to_path_buf(),
            source,
        })?;
        let header = Header::parse(&bytes).map_err(|reason| OpError::Image {
            path: path.to_path_buf(),
            reason,
        })?;

        let Header {
            width,
            height,
            channels,
            offset,
        } = header;
        let expected = header.raster_size().ok_or_else(|| OpError::Image {
            path: path.to_path_buf(),
            reason: format!("image of {width}x{height} is too large"),
        })?;
        let raster = &bytes[offset..];
        if raster.len() < expected {
            return Err(OpError::Truncated {
                path: path.to_path_buf(),
                expected,
                found: raster.len(),
            });
        }

        // interleaved rows to planar columns
        let mut contents = vec![0.0f32; expected];
        for (index, &pixel) in raster[..expected].iter().enumerate() {
            let c = index % channels;
            let x = (index / channels) % width;
            let y = index / channels / width;
            contents[y + height * (x + width * c)] = pixel as f32;
        }
        Ok((header, contents))
    }
}

impl Operation for LoadImage {
    fn r#type(&self) -> &str {
        "LoadImage"
    }

    fn execute(&self, op: &OpDesc, workspace: &mut Workspace) -> Result<(), OpError> {
        let name = op.output(0)?;
        let file_name: String = op.field("fileName")?;

        if !self.force_reload && workspace.exists(name) {
            log::debug!("{name} is cached, skip loading {file_name}");
            return Ok(());
        }

        let path = workspace.resolve(&file_name);
        let (header, contents) = match Self::decode(&path) {
            Ok(image) => image,
            Err(err) => return self.missing_resource.handle(err),
        };

        let shape = [header.height, header.width, header.channels];
        let tensor = workspace.get_or_create(name, DataType::F32, shape)?;
        tensor.write_slice(&contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::{Header, LoadImage};
    use crate::{
        hal::ResourcePolicy,
        loom::{
            num::DataType,
            ops::{OpDesc, OpError, Operation},
            shape::Shape,
            workspace::Workspace,
        },
    };

    fn image_op(name: &str, file_name: &str) -> OpDesc {
        OpDesc::new("LoadImage")
            .with_outputs([name])
            .with_field("fileName", file_name)
    }

    #[test]
    fn test_header() {
        let header = Header::parse(b"P6\n# made by hand\n3 2\n255\nabc");
        assert_eq!(
            header,
            Ok(Header {
                width: 3,
                height: 2,
                channels: 3,
                offset: 26,
            })
        );

        assert!(Header::parse(b"P3\n1 1\n255\n").is_err());
        assert!(Header::parse(b"P5 1 1 65535 ").is_err());
        assert!(Header::parse(b"P5 1 1").is_err());
        assert!(Header::parse(b"P5 x 1 255 ").is_err());
    }

    #[test]
    fn test_load_ppm() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        // 2 rows, 3 columns, RGB
        let raster: Vec<u8> = (0..18).collect();
        let mut bytes = b"P6 3 2 255\n".to_vec();
        bytes.extend_from_slice(&raster);
        std::fs::write(dir.path().join("image.ppm"), bytes)?;

        let mut ws = Workspace::new(dir.path());
        LoadImage::new().execute(&image_op("image", "image.ppm"), &mut ws)?;

        let image = ws.get("image");
        assert_eq!(image.data_type(), DataType::F32);
        assert_eq!(image.shape(), Shape::from([2, 3, 3]));

        let contents = image.read_slice::<f32>()?;
        for y in 0..2 {
            for x in 0..3 {
                for c in 0..3 {
                    let expected = raster[(y * 3 + x) * 3 + c] as f32;
                    assert_eq!(contents[y + 2 * (x + 3 * c)], expected);
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_load_pgm() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("grey.pgm"), b"P5\n2 2\n200\n\x01\x02\x03\x04")?;

        let mut ws = Workspace::new(dir.path());
        LoadImage::new().execute(&image_op("grey", "grey.pgm"), &mut ws)?;

        let grey = ws.get("grey");
        assert_eq!(grey.shape(), Shape::from([2, 2, 1]));
        assert_eq!(grey.read_slice::<f32>()?, vec![1.0, 3.0, 2.0, 4.0]);
        Ok(())
    }

    #[test]
    fn test_bad_image() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("short.pgm"), b"P5 2 2 255\n\x01")?;
        std::fs::write(dir.path().join("text.txt"), b"hello")?;

        let mut ws = Workspace::new(dir.path());
        assert!(matches!(
            LoadImage::new().execute(&image_op("a", "short.pgm"), &mut ws),
            Err(OpError::Truncated {
                expected: 4,
                found: 1,
                ..
            })
        ));
        assert!(matches!(
            LoadImage::new().execute(&image_op("a", "text.txt"), &mut ws),
            Err(OpError::Image { .. })
        ));
        assert!(matches!(
            LoadImage::new().execute(&image_op("a", "missing.ppm"), &mut ws),
            Err(OpError::Resource { .. })
        ));

        LoadImage::new()
            .with_missing_resource(ResourcePolicy::Warn)
            .execute(&image_op("a", "missing.ppm"), &mut ws)?;
        assert!(!ws.exists("a"));
        Ok(())
    }
}

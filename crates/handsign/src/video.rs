//! Frame sources.

use std::{
    fs,
    path::{Path, PathBuf},
};

use handsign_image::{is_supported_path, Image, Resolution};

use crate::timer::Timer;

/// A sequence of frames of fixed size.
pub trait FrameSource {
    /// Returns the next frame, or [`None`] once the source is exhausted.
    ///
    /// This may block until a frame is available. An error ends the session.
    fn next_frame(&mut self) -> anyhow::Result<Option<Image>>;

    /// Stage timers reported alongside the pipeline's frame rate.
    fn timers(&self) -> Vec<&Timer> {
        Vec::new()
    }
}

impl<S: FrameSource + ?Sized> FrameSource for &mut S {
    fn next_frame(&mut self) -> anyhow::Result<Option<Image>> {
        (**self).next_frame()
    }

    fn timers(&self) -> Vec<&Timer> {
        (**self).timers()
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> anyhow::Result<Option<Image>> {
        (**self).next_frame()
    }

    fn timers(&self) -> Vec<&Timer> {
        (**self).timers()
    }
}

/// Frames held in memory.
impl FrameSource for std::vec::IntoIter<Image> {
    fn next_frame(&mut self) -> anyhow::Result<Option<Image>> {
        Ok(self.next())
    }
}

/// Reads the frames of a recording stored as a directory of numbered images.
///
/// Files are played back in lexicographic order of their names, so frame numbers should be
/// zero-padded. Only JPEG and PNG files are considered, everything else in the directory is
/// ignored.
pub struct ImageSequence {
    paths: std::vec::IntoIter<PathBuf>,
    resolution: Option<Resolution>,
    t_decode: Timer,
}

impl ImageSequence {
    /// Lists the frames in `dir`.
    ///
    /// Fails if `dir` cannot be read or contains no frames.
    pub fn open<P: AsRef<Path>>(dir: P) -> anyhow::Result<Self> {
        Self::open_impl(dir.as_ref())
    }

    fn open_impl(dir: &Path) -> anyhow::Result<Self> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)
            .map_err(|e| {
                anyhow::anyhow!("failed to read frame directory {}: {}", dir.display(), e)
            })?
        {
            let path = entry?.path();
            if path.is_file() && is_supported_path(&path) {
                paths.push(path);
            }
        }
        if paths.is_empty() {
            anyhow::bail!("no JPEG or PNG frames found in {}", dir.display());
        }
        paths.sort();

        log::info!("playing {} frames from {}", paths.len(), dir.display());
        Ok(Self {
            paths: paths.into_iter(),
            resolution: None,
            t_decode: Timer::new("decode"),
        })
    }

    /// Returns the number of frames that have not been read yet.
    pub fn remaining(&self) -> usize {
        self.paths.len()
    }

}

impl FrameSource for ImageSequence {
    /// Decodes the next frame.
    ///
    /// Fails if a frame cannot be decoded or its size differs from the first frame's.
    fn next_frame(&mut self) -> anyhow::Result<Option<Image>> {
        let Some(path) = self.paths.next() else {
            return Ok(None);
        };
        let image = self.t_decode.time(|| Image::load(&path))?;
        match self.resolution {
            None => self.resolution = Some(image.resolution()),
            Some(res) if res != image.resolution() => anyhow::bail!(
                "frame {} has size {}, but the sequence started at {}",
                path.display(),
                image.resolution(),
                res
            ),
            Some(_) => {}
        }
        log::trace!("read frame {}", path.display());
        Ok(Some(image))
    }

    fn timers(&self) -> Vec<&Timer> {
        vec![&self.t_decode]
    }
}

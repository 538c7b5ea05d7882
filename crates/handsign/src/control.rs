//! External control commands.
//!
//! Commands are only looked at between pipeline cycles, never while a frame is being processed.

use std::{
    io::{self, BufRead},
    thread,
};

use crossbeam::channel::{Receiver, Sender, TryRecvError};

/// A command issued from outside of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Discard the tracker and wait for a new initial region.
    StopTracking,
    /// End the session.
    Quit,
}

impl ControlSignal {
    /// Maps a key to its command: `t` stops tracking, `q` quits.
    pub fn from_key(key: char) -> Option<Self> {
        match key.to_ascii_lowercase() {
            't' => Some(ControlSignal::StopTracking),
            'q' => Some(ControlSignal::Quit),
            _ => None,
        }
    }
}

/// Receiving end of a stream of [`ControlSignal`]s.
pub struct Controls {
    recv: Option<Receiver<ControlSignal>>,
}

impl Controls {
    /// Controls that never issue any command.
    pub fn none() -> Self {
        Self { recv: None }
    }

    /// Creates a [`Sender`] to issue commands through, and the [`Controls`] receiving them.
    pub fn channel() -> (Sender<ControlSignal>, Self) {
        let (sender, recv) = crossbeam::channel::unbounded();
        (sender, Self { recv: Some(recv) })
    }

    /// Reads commands from standard input on a background thread.
    ///
    /// Every `t` or `q` character typed (followed by Enter) issues the corresponding command.
    pub fn stdin() -> io::Result<Self> {
        let (sender, controls) = Self::channel();
        thread::Builder::new()
            .name("controls".into())
            .spawn(move || {
                for line in io::stdin().lock().lines() {
                    let Ok(line) = line else { break };
                    for signal in line.chars().filter_map(ControlSignal::from_key) {
                        if sender.send(signal).is_err() {
                            return;
                        }
                    }
                }
                log::debug!("standard input closed, no more control commands");
            })?;
        Ok(controls)
    }

    /// Returns the next pending command without blocking.
    ///
    /// Returns [`None`] if there is none, including when the sending side is gone.
    pub fn poll(&mut self) -> Option<ControlSignal> {
        let recv = self.recv.as_ref()?;
        match recv.try_recv() {
            Ok(signal) => Some(signal),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.recv = None;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys() {
        assert_eq!(ControlSignal::from_key('t'), Some(ControlSignal::StopTracking));
        assert_eq!(ControlSignal::from_key('Q'), Some(ControlSignal::Quit));
        assert_eq!(ControlSignal::from_key('x'), None);
    }

    #[test]
    fn channel_delivers_in_order() {
        let (sender, mut controls) = Controls::channel();
        assert_eq!(controls.poll(), None);
        sender.send(ControlSignal::StopTracking).unwrap();
        sender.send(ControlSignal::Quit).unwrap();
        assert_eq!(controls.poll(), Some(ControlSignal::StopTracking));
        assert_eq!(controls.poll(), Some(ControlSignal::Quit));
        assert_eq!(controls.poll(), None);

        drop(sender);
        assert_eq!(controls.poll(), None);
        assert_eq!(controls.poll(), None);
    }

    #[test]
    fn none_is_silent() {
        assert_eq!(Controls::none().poll(), None);
    }
}

//! "thinking..." indicator shown while waiting on the model.

use crossterm::{
    cursor::{Hide, MoveToColumn, Show},
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{Clear, ClearType},
};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Spinner animation frames - braille pattern spinner
pub const SPINNER_BRAILLE: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

const FRAME_DURATION: Duration = Duration::from_millis(80);

/// Animates on stderr from a background thread until stopped or dropped.
pub struct Spinner {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Spinner {
    /// Start the spinner (hides cursor)
    pub fn start(message: &str) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let message = message.to_string();

        let handle = thread::spawn(move || {
            let _ = execute!(io::stderr(), Hide);
            let mut frame = 0;
            while !flag.load(Ordering::Relaxed) {
                render(SPINNER_BRAILLE[frame], &message);
                frame = (frame + 1) % SPINNER_BRAILLE.len();
                thread::sleep(FRAME_DURATION);
            }
            let _ = execute!(
                io::stderr(),
                MoveToColumn(0),
                Clear(ClearType::CurrentLine),
                Show
            );
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Stop the spinner (shows cursor, clears line)
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        self.halt();
    }
}

fn render(frame: char, message: &str) {
    let _ = execute!(
        io::stderr(),
        MoveToColumn(0),
        Clear(ClearType::CurrentLine),
        SetForegroundColor(Color::Rgb { r: 140, g: 140, b: 140 }),
        Print(format!("  {} ", frame)),
        SetForegroundColor(Color::Rgb { r: 180, g: 180, b: 180 }),
        Print(message),
        ResetColor
    );
    let _ = io::stderr().flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spinner_stops_its_thread() {
        let spinner = Spinner::start("thinking...");
        thread::sleep(Duration::from_millis(20));
        let stop = Arc::clone(&spinner.stop);
        spinner.stop();
        assert!(stop.load(Ordering::Relaxed));
    }
}

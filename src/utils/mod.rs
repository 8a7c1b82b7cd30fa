pub(crate) mod array_helper;
#[cfg(test)]
pub(crate) mod tests;

use env_logger::Builder;
use log::LevelFilter;
use std::fmt;
use std::io::Write;
use std::time::Instant;

/// A simple timer based on std::time::Instant, to implement the std::fmt::Display trait on
pub struct Timer {
    time: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Timer {
            time: Instant::now(),
        }
    }
}

impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:>68} {:>8.2} s",
            "elapsed time:",
            self.time.elapsed().as_secs_f32()
        )
    }
}

/// Sets up the logger. The verbosity follows the `verbose` setting of the configuration:
/// 2 is trace, 1 debug, 0 info, -1 warnings and -2 errors only. Calling it more than once is
/// harmless, only the first call has an effect.
pub fn init_logger(verbose: i8) {
    let log_level: LevelFilter = match verbose {
        2 => LevelFilter::Trace,
        1 => LevelFilter::Debug,
        0 => LevelFilter::Info,
        -1 => LevelFilter::Warn,
        -2 => LevelFilter::Error,
        _ => LevelFilter::Info,
    };
    let _ = Builder::new()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .filter(None, log_level)
        .try_init();
}

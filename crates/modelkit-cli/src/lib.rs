//! Shared pieces of the modelkit binaries.

use std::panic::{self, AssertUnwindSafe};

use clap::ValueEnum;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

use modelkit_core::ModelFamily;

/// Install the global subscriber, level picked by `-v` count.
pub fn init_logging(verbose: u8) -> anyhow::Result<()> {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Run `f`, turning a panic into an internal error instead of a crash.
pub fn guarded<T>(f: impl FnOnce() -> anyhow::Result<T>) -> anyhow::Result<T> {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(|info| debug!("{}", info)));
    let outcome = panic::catch_unwind(AssertUnwindSafe(f));
    panic::set_hook(previous);

    match outcome {
        Ok(result) => result,
        Err(payload) => {
            let message = if let Some(s) = payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            anyhow::bail!("internal error: {}", message)
        }
    }
}

/// Model family as spelled on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum FamilyArg {
    /// Image classification
    Classification,
    /// SSD-style object detection
    Detection,
    /// Mask R-CNN-style instance segmentation
    InstanceSegmentation,
}

impl From<FamilyArg> for ModelFamily {
    fn from(arg: FamilyArg) -> Self {
        match arg {
            FamilyArg::Classification => ModelFamily::Classification,
            FamilyArg::Detection => ModelFamily::Detection,
            FamilyArg::InstanceSegmentation => ModelFamily::InstanceSegmentation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guarded_reports_panics() {
        assert_eq!(guarded(|| Ok(7)).unwrap(), 7);

        let err = guarded::<()>(|| anyhow::bail!("no model")).unwrap_err();
        assert_eq!(err.to_string(), "no model");

        let err = guarded::<()>(|| panic!("index out of bounds")).unwrap_err();
        assert_eq!(err.to_string(), "internal error: index out of bounds");

        let err = guarded::<()>(|| panic!("bad shape {:?}", [1, 3])).unwrap_err();
        assert_eq!(err.to_string(), "internal error: bad shape [1, 3]");
    }

    #[test]
    fn test_family_arg_names() {
        assert_eq!(
            FamilyArg::from_str("instance-segmentation", false).unwrap(),
            FamilyArg::InstanceSegmentation
        );
        assert_eq!(
            ModelFamily::from(FamilyArg::Detection),
            ModelFamily::Detection
        );
        assert!(FamilyArg::from_str("ocr", false).is_err());
    }
}

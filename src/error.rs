//! Error types for the simulation core.

use crate::strategy::DispersalVector;

/// Errors that abort a simulation run
#[derive(Debug)]
pub enum SimError {
    /// Random savanna-cell search exhausted its attempt budget (landscape fully forested)
    NoSavannaCell { attempts: usize },
    /// A tree needs a kernel for a dispersal vector that was never registered
    MissingGlobalKernel(DispersalVector),
    /// `update()` was called before `init_state()`
    StateNotInitialized,
    /// `update()` was called before `set_global_kernels()`
    KernelsNotRegistered,
    /// Colour field requested for an animal species that does not exist
    UnknownSpecies(String),
    InvalidConfig(String),
    Io(std::io::Error),
}

impl std::fmt::Display for SimError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoSavannaCell { attempts } => {
                write!(f, "Could not find savanna cell after {} attempts", attempts)
            }
            Self::MissingGlobalKernel(vector) => {
                write!(f, "No global kernel registered for dispersal vector '{}'", vector)
            }
            Self::StateNotInitialized => write!(f, "State not initialized (call init_state first)"),
            Self::KernelsNotRegistered => {
                write!(f, "Global kernels not registered (call set_global_kernels first)")
            }
            Self::UnknownSpecies(species) => write!(f, "Unknown animal species: {}", species),
            Self::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            Self::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for SimError {}

impl From<std::io::Error> for SimError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Result alias used throughout the core
pub type SimResult<T> = Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = SimError::NoSavannaCell { attempts: 1_000_000 };
        assert!(err.to_string().contains("1000000"));

        let err = SimError::MissingGlobalKernel(DispersalVector::Wind);
        assert!(err.to_string().contains("wind"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: SimError = io.into();
        assert!(matches!(err, SimError::Io(_)));
    }
}

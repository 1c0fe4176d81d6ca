//! Resolves where a photo was taken: from its EXIF GPS tags when they are
//! usable, otherwise from coordinates stamped on the image and read back
//! with text recognition.

pub mod budget;
pub mod constants;
pub mod coords;
pub mod error;
pub mod exif_parser;
pub mod logging;
pub mod preprocess;
pub mod processing;
pub mod recognition;
pub mod records;
pub mod resolver;
pub mod settings;
pub mod text_parser;

pub use budget::RecognitionBudget;
pub use coords::CoordinatePair;
pub use error::{ParseError, RecognitionError, ResolveError};
pub use records::{CoordinateSource, ImageRecord};
pub use resolver::{Resolver, ResolverPolicy};
pub use text_parser::{parse_coordinates, CoordinateFormat, TextMatch};

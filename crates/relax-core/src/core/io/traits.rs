use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Defines the interface for reading structural file formats.
///
/// Parsers produce a format specific record set which the structural object
/// then converts into its model and molecule containers.
pub trait StructureFile {
    /// The parsed contents of one file.
    type Records;

    /// The error type for I/O and parsing failures.
    type Error: Error + From<io::Error>;

    /// Reads all records from a buffered reader.
    ///
    /// # Arguments
    ///
    /// * `reader` - The buffered reader to read from.
    ///
    /// # Return
    ///
    /// Returns the parsed records of the file.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails or I/O operations encounter issues.
    fn read_from(reader: &mut impl BufRead) -> Result<Self::Records, Self::Error>;

    /// Reads all records from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or parsing fails.
    fn read_from_path<P: AsRef<Path>>(path: P) -> Result<Self::Records, Self::Error> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Self::read_from(&mut reader)
    }
}

/// Defines the interface for writing a structural format.
pub trait StructureWriter {
    /// The object being written.
    type Source: ?Sized;

    /// Writer options, such as the model to write.
    type Options;

    type Error: Error + From<io::Error>;

    /// Writes the source object to a writer.
    ///
    /// # Errors
    ///
    /// Returns an error if formatting or the underlying writer fails.
    fn write_to(
        source: &Self::Source,
        options: &Self::Options,
        writer: &mut impl Write,
    ) -> Result<(), Self::Error>;

    /// Writes the source object to a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or writing fails.
    fn write_to_path<P: AsRef<Path>>(
        source: &Self::Source,
        options: &Self::Options,
        path: P,
    ) -> Result<(), Self::Error> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        Self::write_to(source, options, &mut writer)?;
        writer.flush()?;
        Ok(())
    }
}

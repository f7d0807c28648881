pub mod address;
pub mod document;
pub mod extract;
pub mod inject;
pub mod validate;

pub use address::AddressBook;
pub use document::{parse_document, read_document, write_document, XmlDocument};
pub use extract::{extract_file, extract_texts, ExtractQuery};
pub use inject::{inject_file, inject_translations, InjectReport};
pub use validate::{compare, compare_files, fingerprint, Fingerprint, StructureDiff};

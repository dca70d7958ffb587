//! Background definition loading.
//!
//! A one-shot worker thread reads every declaration file below the
//! configured folder and builds a fresh library, handing it over a
//! channel. The first consumer blocks on the channel; afterwards the
//! library lives on the owning manager and no further synchronisation
//! is required.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use basalt_core::{FileInfo, RegistryConfig, Vfs};
use basalt_lang::{BlockTokeniser, Material, TableDefinition};
use tracing::{debug, warn};

use crate::library::{DefinitionLibrary, MaterialRecord};

/// Handle to the in-flight load. `join` blocks until the worker is
/// done and can be called exactly once.
pub struct DefLoader {
    receiver: mpsc::Receiver<DefinitionLibrary>,
}

impl DefLoader {
    /// Start loading on a background thread.
    pub fn spawn(vfs: Arc<dyn Vfs>, config: RegistryConfig) -> Self {
        let (sender, receiver) = mpsc::channel();

        thread::spawn(move || {
            let library = load_all(vfs.as_ref(), &config);
            // The receiver may be gone if the manager was dropped
            let _ = sender.send(library);
        });

        Self { receiver }
    }

    /// Wait for the load to finish and take the library.
    pub fn join(self) -> DefinitionLibrary {
        self.receiver.recv().unwrap_or_default()
    }
}

/// Synchronous load of every declaration file below the configured
/// folder.
pub fn load_all(vfs: &dyn Vfs, config: &RegistryConfig) -> DefinitionLibrary {
    let mut files = Vec::new();
    vfs.for_each_file(&config.materials_folder, &config.extension, &mut |info| {
        files.push(info.clone());
    });

    debug!(
        "loading {} material files from {}/",
        files.len(),
        config.materials_folder
    );

    let mut library = DefinitionLibrary::new();

    for file in files {
        match vfs.read_text_file(&file.full_path()) {
            Ok(text) => parse_declarations(&mut library, &text, &file),
            Err(err) => warn!("cannot read {}: {}", file.full_path(), err),
        }
    }

    debug!("loaded {} definitions", library.num_definitions());

    library
}

/// Parse every declaration in one file into the library. A parse error
/// is confined to the affected declaration; remaining declarations of
/// the file still load. Duplicate names are logged and the later
/// declaration wins.
pub fn parse_declarations(library: &mut DefinitionLibrary, text: &str, file: &FileInfo) {
    let mut tokeniser = BlockTokeniser::new(text);

    loop {
        match tokeniser.next_block() {
            Ok(Some(block)) => {
                if let Some(table_name) = declaration_name(&block.name, "table") {
                    let table = TableDefinition::new(table_name, block.contents);

                    // Surface syntax problems at load time; the values
                    // stay lazily available either way
                    if let Err(err) = table.ensure_parsed() {
                        warn!("skipping table '{}' in {}: {}", table.name(), file.name, err);
                        continue;
                    }

                    if library.replace_table(table).is_some() {
                        warn!("duplicate table '{}' in {}, using latest", table_name, file.name);
                    }
                } else {
                    let name = declaration_name(&block.name, "material")
                        .unwrap_or(block.name.as_str())
                        .to_string();

                    let record = MaterialRecord {
                        material: Material::from_block(&name, block.contents),
                        file: file.clone(),
                    };

                    if library.replace_material(record).is_some() {
                        warn!("duplicate material '{}' in {}, using latest", name, file.name);
                    }
                }
            }
            Ok(None) => break,
            Err(err) => {
                warn!("error tokenising {}: {}", file.name, err);
                break;
            }
        }
    }
}

/// Strip an optional leading type keyword off a block name:
/// `table flicker` has declaration name `flicker`.
fn declaration_name<'a>(block_name: &'a str, keyword: &str) -> Option<&'a str> {
    let mut words = block_name.split_whitespace();
    if !words.next()?.eq_ignore_ascii_case(keyword) {
        return None;
    }
    words.next()
}

//! The material manager: the facade external collaborators talk to.
//!
//! Wraps the definition library, joins the background loader on first
//! use and implements the save path: regenerate the declaration text,
//! splice it into the origin file and atomically replace the target.

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::io::Write as _;
use std::sync::Arc;

use basalt_core::{BasaltError, BasaltResult, FileInfo, RegistryConfig, Vfs};
use basalt_lang::writer::GENERATION_COMMENT;
use basalt_lang::{pipe_until_insertion_point, Material, TableDefinition};
use tracing::{debug, info, warn};

use crate::library::{DefinitionLibrary, MaterialRecord};
use crate::loader::DefLoader;
use crate::splice::{decl_name_pattern, TempFileWriter};

pub struct MaterialManager {
    config: RegistryConfig,
    loader: Option<DefLoader>,
    library: Option<DefinitionLibrary>,
}

impl MaterialManager {
    /// Create a manager and start loading definitions in the
    /// background. The first call that needs them blocks until the
    /// load has finished.
    pub fn new(vfs: Arc<dyn Vfs>, config: RegistryConfig) -> Self {
        Self {
            loader: Some(DefLoader::spawn(vfs, config.clone())),
            library: None,
            config,
        }
    }

    /// Wrap an already-built library; used by tests and tooling that
    /// load synchronously.
    pub fn with_library(library: DefinitionLibrary, config: RegistryConfig) -> Self {
        Self {
            config,
            loader: None,
            library: Some(library),
        }
    }

    fn ensure_defs_loaded(&mut self) -> &mut DefinitionLibrary {
        if self.library.is_none() {
            self.library = Some(match self.loader.take() {
                Some(loader) => loader.join(),
                None => DefinitionLibrary::new(),
            });
        }

        self.library
            .as_mut()
            .expect("definition library is initialised above")
    }

    /// Read access to the loaded library, e.g. as an expression
    /// evaluation context.
    pub fn library(&mut self) -> &DefinitionLibrary {
        self.ensure_defs_loaded()
    }

    pub fn material_exists(&mut self, name: &str) -> bool {
        self.ensure_defs_loaded().material_exists(name)
    }

    pub fn get_material(&mut self, name: &str) -> Option<&Material> {
        self.ensure_defs_loaded()
            .material(name)
            .map(|record| &record.material)
    }

    pub fn get_material_mut(&mut self, name: &str) -> Option<&mut Material> {
        self.ensure_defs_loaded()
            .material_mut(name)
            .map(|record| &mut record.material)
    }

    pub fn foreach_material(&mut self, callback: impl FnMut(&Material)) {
        self.ensure_defs_loaded().foreach_material(callback);
    }

    pub fn get_table(&mut self, name: &str) -> Option<&TableDefinition> {
        self.ensure_defs_loaded().table(name)
    }

    /// Create a new empty material. The requested name is probed for
    /// conflicts; the actual name is returned.
    pub fn create_empty_material(&mut self, name: &str) -> String {
        let library = self.ensure_defs_loaded();
        let candidate = library.non_conflicting_name(name);

        library.add_material(MaterialRecord {
            material: Material::new_empty(&candidate),
            file: FileInfo::default(),
        });

        candidate
    }

    pub fn rename_material(&mut self, old_name: &str, new_name: &str) -> bool {
        if old_name == new_name {
            warn!("cannot rename, the new name is no different");
            return false;
        }

        let library = self.ensure_defs_loaded();

        if !library.material_exists(old_name) {
            warn!("cannot rename non-existent material {}", old_name);
            return false;
        }

        if library.material_exists(new_name) {
            warn!(
                "cannot rename material to {} since this name is already in use",
                new_name
            );
            return false;
        }

        library.rename_material(old_name, new_name)
    }

    pub fn remove_material(&mut self, name: &str) {
        let library = self.ensure_defs_loaded();

        if !library.remove_material(name) {
            warn!("cannot remove non-existent material {}", name);
        }
    }

    /// Copy a material under a name derived from the hint; returns the
    /// name of the copy. The copy starts out modified and without file
    /// provenance of its own.
    pub fn copy_material(&mut self, source: &str, name_hint: &str) -> Option<String> {
        if name_hint.is_empty() {
            warn!("cannot copy, the new name must not be empty");
            return None;
        }

        let library = self.ensure_defs_loaded();

        match library.copy_material(source, name_hint) {
            Some(name) => Some(name),
            None => {
                warn!("cannot copy non-existent material {}", source);
                None
            }
        }
    }

    /// False for unknown materials and for definitions whose
    /// provenance is virtual/generated rather than a physical file.
    pub fn material_can_be_modified(&mut self, name: &str) -> bool {
        match self.ensure_defs_loaded().material(name) {
            Some(record) => !record.file.is_empty() && record.file.is_physical,
            None => false,
        }
    }

    /// Assign the save target for a material that has no file
    /// provenance yet (freshly created or copied). The path is
    /// relative to the writable mod directory.
    pub fn set_save_path(&mut self, name: &str, relative_path: &str) -> bool {
        match self.ensure_defs_loaded().material_mut(name) {
            Some(record) => {
                record.file = FileInfo::new("", relative_path, true);
                true
            }
            None => false,
        }
    }

    /// Save a modified material back into its origin file, preserving
    /// every other byte of the file. No-op for unmodified materials.
    pub fn save_material(&mut self, name: &str) -> BasaltResult<()> {
        let mod_path = self
            .config
            .require_mod_path()
            .map(|path| path.to_path_buf());

        let library = self.ensure_defs_loaded();

        let record = library
            .material(name)
            .ok_or_else(|| BasaltError::Other(format!("cannot save unknown material '{}'", name)))?;

        if !record.material.is_modified() {
            debug!("material {} is not modified, nothing to save", name);
            return Ok(());
        }

        if record.file.is_empty() || !record.file.is_physical {
            return Err(BasaltError::ReadOnly(name.to_string()));
        }

        let output_path = mod_path?.join(record.file.full_path());
        let decl_name = record.material.name().to_string();
        let body = record.material.definition();

        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                BasaltError::save(
                    format!("cannot create output directory: {}", err),
                    parent.to_path_buf(),
                )
            })?;
        }

        info!("saving material {} to {}", decl_name, output_path.display());

        let mut temp = TempFileWriter::create(&output_path)?;

        if output_path.exists() {
            let input = File::open(&output_path).map_err(|err| {
                BasaltError::save(
                    format!("cannot open file for reading: {}", err),
                    output_path.clone(),
                )
            })?;
            let mut reader = BufReader::new(input);

            // Copy everything in front of the declaration, then skip
            // its old body
            let pattern = decl_name_pattern(&decl_name)?;
            let found = pipe_until_insertion_point(&mut reader, temp.stream(), &pattern)
                .map_err(|err| {
                    BasaltError::save(format!("error while splicing: {}", err), output_path.clone())
                })?;

            if !found {
                // Declaration not present yet, append it at the end
                write!(temp.stream(), "\n{}", GENERATION_COMMENT)
                    .map_err(BasaltError::from)?;
            }

            write_declaration(temp.stream(), &decl_name, &body)?;

            io::copy(&mut reader, temp.stream()).map_err(|err| {
                BasaltError::save(format!("error while splicing: {}", err), output_path.clone())
            })?;
        } else {
            write!(temp.stream(), "{}", GENERATION_COMMENT).map_err(BasaltError::from)?;
            write_declaration(temp.stream(), &decl_name, &body)?;
        }

        temp.commit()?;

        // Persisted: commit the edits and refresh provenance
        let record = library
            .material_mut(name)
            .expect("record existed at the start of the save");
        record.material.commit();
        record.file.is_physical = true;

        Ok(())
    }
}

fn write_declaration(stream: &mut dyn io::Write, name: &str, body: &str) -> BasaltResult<()> {
    write!(stream, "{}\n{{{}}}\n", name, body).map_err(BasaltError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parse_declarations;

    fn manager_with(text: &str) -> MaterialManager {
        let mut library = DefinitionLibrary::new();
        let file = FileInfo::new("materials", "test.mtr", true);
        parse_declarations(&mut library, text, &file);
        MaterialManager::with_library(library, RegistryConfig::default())
    }

    #[test]
    fn test_create_empty_material_probes_names() {
        let mut manager = manager_with("textures/a\n{\n\tdiffusemap a\n}\n");

        let name = manager.create_empty_material("textures/a");
        assert_eq!(name, "textures/a01");
        assert!(manager.get_material("textures/a01").is_some());
        assert!(manager.get_material(&name).unwrap().is_modified());
    }

    #[test]
    fn test_new_material_is_not_modifiable_until_path_assigned() {
        let mut manager = manager_with("");
        let name = manager.create_empty_material("textures/new");

        assert!(!manager.material_can_be_modified(&name));
        assert!(manager.set_save_path(&name, "materials/custom.mtr"));
        assert!(manager.material_can_be_modified(&name));
    }

    #[test]
    fn test_rename_material() {
        let mut manager = manager_with("textures/a\n{\n\tdiffusemap a\n}\n");

        assert!(!manager.rename_material("textures/a", "textures/a"));
        assert!(manager.rename_material("textures/a", "textures/b"));
        assert!(manager.get_material("textures/a").is_none());
        assert!(manager.get_material("textures/b").is_some());
    }

    #[test]
    fn test_save_unmodified_is_a_noop() {
        let mut manager = manager_with("textures/a\n{\n\tdiffusemap a\n}\n");
        // No mod path configured, but unmodified saves return before
        // the configuration is needed
        assert!(manager.save_material("textures/a").is_ok());
    }

    #[test]
    fn test_save_without_mod_path_fails() {
        let mut manager = manager_with("textures/a\n{\n\tdiffusemap a\n}\n");
        manager
            .get_material_mut("textures/a")
            .unwrap()
            .set_description("changed");

        assert!(matches!(
            manager.save_material("textures/a"),
            Err(BasaltError::MissingConfig(_))
        ));
    }

    #[test]
    fn test_save_virtual_material_is_rejected() {
        let mut manager = MaterialManager::with_library(
            DefinitionLibrary::new(),
            RegistryConfig {
                mod_path: Some(std::env::temp_dir()),
                ..RegistryConfig::default()
            },
        );
        let name = manager.create_empty_material("textures/virtual");
        manager.get_material_mut(&name).unwrap().set_description("x");

        assert!(matches!(
            manager.save_material(&name),
            Err(BasaltError::ReadOnly(_))
        ));
    }
}

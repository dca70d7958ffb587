//! The definition library: name→definition maps for materials and
//! tables. Tables and materials are independent namespaces; within each
//! one, names are unique.

use std::collections::HashMap;

use basalt_core::FileInfo;
use basalt_lang::expr::EvalContext;
use basalt_lang::{Material, TableDefinition};

/// A material plus the provenance of the file it was parsed from.
#[derive(Debug, Clone)]
pub struct MaterialRecord {
    pub material: Material,
    pub file: FileInfo,
}

#[derive(Debug, Default)]
pub struct DefinitionLibrary {
    materials: HashMap<String, MaterialRecord>,
    tables: HashMap<String, TableDefinition>,
}

impl DefinitionLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_definitions(&self) -> usize {
        self.materials.len() + self.tables.len()
    }

    pub fn material_exists(&self, name: &str) -> bool {
        self.materials.contains_key(name)
    }

    /// Insert a material record; refuses to overwrite an existing name.
    pub fn add_material(&mut self, record: MaterialRecord) -> bool {
        if self.materials.contains_key(record.material.name()) {
            return false;
        }
        self.materials
            .insert(record.material.name().to_string(), record);
        true
    }

    /// Insert or replace a material record, returning the replaced one.
    /// Used by the loader (duplicate names: last parsed wins) and by
    /// the save path when it refreshes provenance.
    pub fn replace_material(&mut self, record: MaterialRecord) -> Option<MaterialRecord> {
        self.materials
            .insert(record.material.name().to_string(), record)
    }

    pub fn material(&self, name: &str) -> Option<&MaterialRecord> {
        self.materials.get(name)
    }

    pub fn material_mut(&mut self, name: &str) -> Option<&mut MaterialRecord> {
        self.materials.get_mut(name)
    }

    pub fn remove_material(&mut self, name: &str) -> bool {
        self.materials.remove(name).is_some()
    }

    /// Rename a material; fails when the old name is missing or the new
    /// name is already taken.
    pub fn rename_material(&mut self, old_name: &str, new_name: &str) -> bool {
        if self.materials.contains_key(new_name) {
            return false;
        }
        match self.materials.remove(old_name) {
            Some(mut record) => {
                record.material.rename(new_name);
                self.materials.insert(new_name.to_string(), record);
                true
            }
            None => false,
        }
    }

    /// Clone a material under a new, non-conflicting name derived from
    /// the hint. Returns the name of the copy.
    pub fn copy_material(&mut self, source: &str, name_hint: &str) -> Option<String> {
        let source_record = self.materials.get(source)?;

        let name = self.non_conflicting_name(name_hint);
        let mut record = source_record.clone();
        record.material.rename(&name);

        self.materials.insert(name.clone(), record);
        Some(name)
    }

    /// Probe `hint`, `hint01`, `hint02`, ... until a free name is found.
    pub fn non_conflicting_name(&self, hint: &str) -> String {
        if !self.materials.contains_key(hint) {
            return hint.to_string();
        }

        let mut counter = 0;
        loop {
            counter += 1;
            let candidate = format!("{}{:02}", hint, counter);
            if !self.materials.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    pub fn foreach_material(&self, mut callback: impl FnMut(&Material)) {
        for record in self.materials.values() {
            callback(&record.material);
        }
    }

    pub fn material_names(&self) -> Vec<String> {
        self.materials.keys().cloned().collect()
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn add_table(&mut self, table: TableDefinition) -> bool {
        if self.tables.contains_key(table.name()) {
            return false;
        }
        self.tables.insert(table.name().to_string(), table);
        true
    }

    /// Insert or replace a table (duplicate names: last parsed wins).
    pub fn replace_table(&mut self, table: TableDefinition) -> Option<TableDefinition> {
        self.tables.insert(table.name().to_string(), table)
    }

    pub fn table(&self, name: &str) -> Option<&TableDefinition> {
        self.tables.get(name)
    }

    pub fn clear(&mut self) {
        self.materials.clear();
        self.tables.clear();
    }
}

/// Expressions evaluate against the library so table lookups resolve
/// by name at evaluation time.
impl EvalContext for DefinitionLibrary {
    fn table(&self, name: &str) -> Option<&TableDefinition> {
        self.tables.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> MaterialRecord {
        MaterialRecord {
            material: Material::from_block(name, "diffusemap a\n"),
            file: FileInfo::new("materials", "test.mtr", true),
        }
    }

    #[test]
    fn test_unique_names() {
        let mut library = DefinitionLibrary::new();
        assert!(library.add_material(record("textures/a")));
        assert!(!library.add_material(record("textures/a")));
        assert_eq!(library.num_definitions(), 1);
    }

    #[test]
    fn test_rename() {
        let mut library = DefinitionLibrary::new();
        library.add_material(record("textures/a"));
        library.add_material(record("textures/b"));

        assert!(!library.rename_material("textures/a", "textures/b"));
        assert!(!library.rename_material("textures/missing", "textures/c"));
        assert!(library.rename_material("textures/a", "textures/c"));
        assert!(library.material("textures/a").is_none());
        assert_eq!(
            library.material("textures/c").unwrap().material.name(),
            "textures/c"
        );
    }

    #[test]
    fn test_copy_probes_numeric_suffixes() {
        let mut library = DefinitionLibrary::new();
        library.add_material(record("textures/a"));

        let first = library.copy_material("textures/a", "textures/a").unwrap();
        assert_eq!(first, "textures/a01");

        let second = library.copy_material("textures/a", "textures/a").unwrap();
        assert_eq!(second, "textures/a02");

        let fresh = library.copy_material("textures/a", "textures/new").unwrap();
        assert_eq!(fresh, "textures/new");
    }

    #[test]
    fn test_copy_missing_source() {
        let mut library = DefinitionLibrary::new();
        assert!(library.copy_material("nope", "copy").is_none());
    }

    #[test]
    fn test_tables_are_a_separate_namespace() {
        let mut library = DefinitionLibrary::new();
        library.add_material(record("shared"));
        assert!(library.add_table(TableDefinition::new("shared", "{ 0, 1 }")));
        assert!(library.material_exists("shared"));
        assert!(library.table_exists("shared"));
    }

    #[test]
    fn test_eval_context_resolves_tables() {
        use basalt_lang::Expression;

        let mut library = DefinitionLibrary::new();
        library.add_table(TableDefinition::new("half", "{ 0.5 }"));

        let expr = Expression::parse("half[0] * 4").unwrap();
        assert_eq!(expr.evaluate(0.0, &library), 2.0);
    }
}

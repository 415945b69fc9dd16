use crate::model::ModelSchema;

/// Every model the generator knows about, in registration order.
///
/// Built once before the API is generated and passed by reference to
/// whoever needs to see the other models.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: Vec<ModelSchema>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a schema, replacing any earlier schema with the same name.
    pub fn register(&mut self, schema: ModelSchema) -> &mut Self {
        match self.models.iter_mut().find(|m| m.name == schema.name) {
            Some(existing) => *existing = schema,
            None => self.models.push(schema),
        }
        self
    }

    pub fn with(mut self, schema: ModelSchema) -> Self {
        self.register(schema);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ModelSchema> {
        self.models.iter().find(|m| m.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelSchema> {
        self.models.iter()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldDef;

    #[test]
    fn register_keeps_order_and_replaces_by_name() {
        let mut registry = ModelRegistry::new();
        registry
            .register(ModelSchema::new("Task"))
            .register(ModelSchema::new("User"))
            .register(ModelSchema::new("Task").field(FieldDef::value("title")));

        let names: Vec<_> = registry.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Task", "User"]);
        assert_eq!(registry.get("Task").map(|m| m.fields.len()), Some(1));
        assert!(registry.get("Missing").is_none());
    }
}

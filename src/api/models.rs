use crate::api::{ModelsResponse, ProviderModel};

/// Models offered by the backend, in the order the server listed them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelCatalog {
    pub models: Vec<String>,
    pub providers: Vec<(String, Vec<ProviderModel>)>,
}

impl From<ModelsResponse> for ModelCatalog {
    fn from(response: ModelsResponse) -> Self {
        let mut models = response.models;
        // Older servers only fill the grouped view.
        if models.is_empty() {
            models = response
                .providers
                .values()
                .flatten()
                .map(|model| model.model_id.clone())
                .collect();
        }
        Self {
            models,
            providers: response.providers.into_iter().collect(),
        }
    }
}

impl ModelCatalog {
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.models.iter().any(|model| model == model_id)
    }

    pub fn display_name(&self, model_id: &str) -> Option<&str> {
        self.providers
            .iter()
            .flat_map(|(_, models)| models)
            .find(|model| model.model_id == model_id)
            .map(|model| model.model_name.as_str())
    }

    /// Keep `current` when the backend still offers it, otherwise fall back
    /// to `preferred` and then to the first listed model.
    pub fn pick_current(&self, current: Option<&str>, preferred: Option<&str>) -> Option<String> {
        current
            .filter(|model| self.contains(model))
            .or_else(|| preferred.filter(|model| self.contains(model)))
            .or_else(|| self.models.first().map(String::as_str))
            .map(str::to_owned)
    }
}

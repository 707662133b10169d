use crate::provider_policy::{ProviderPolicy, DEFAULT_MODEL_SELECTOR};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormField {
    DatabaseUri,
    ModelSelector,
    PrimaryCredential,
    CloudAccessKeyId,
    CloudSecretKey,
}

impl FormField {
    pub const ALL: [Self; 5] = [
        Self::DatabaseUri,
        Self::ModelSelector,
        Self::PrimaryCredential,
        Self::CloudAccessKeyId,
        Self::CloudSecretKey,
    ];

    /// Field name used on the wire by the assistant service.
    #[must_use]
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::DatabaseUri => "db_uri",
            Self::ModelSelector => "llm_type",
            Self::PrimaryCredential => "api_key",
            Self::CloudAccessKeyId => "aws_access_key_id",
            Self::CloudSecretKey => "aws_secret_access_key",
        }
    }

    #[must_use]
    pub fn is_credential(self) -> bool {
        matches!(
            self,
            Self::PrimaryCredential | Self::CloudAccessKeyId | Self::CloudSecretKey
        )
    }

    #[must_use]
    pub fn default_label(self) -> &'static str {
        match self {
            Self::DatabaseUri => "Database URI",
            Self::ModelSelector => "LLM Type",
            Self::PrimaryCredential => "API Key",
            Self::CloudAccessKeyId => "Access Key ID",
            Self::CloudSecretKey => "Secret Access Key",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub database_uri: String,
    pub model_selector: String,
    pub primary_credential: String,
    pub cloud_access_key_id: String,
    pub cloud_secret_key: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::with_model(DEFAULT_MODEL_SELECTOR)
    }
}

impl ConnectionConfig {
    #[must_use]
    pub fn with_model(model_selector: impl Into<String>) -> Self {
        Self {
            database_uri: String::new(),
            model_selector: model_selector.into(),
            primary_credential: String::new(),
            cloud_access_key_id: String::new(),
            cloud_secret_key: String::new(),
        }
    }

    #[must_use]
    pub fn value(&self, field: FormField) -> &str {
        match field {
            FormField::DatabaseUri => &self.database_uri,
            FormField::ModelSelector => &self.model_selector,
            FormField::PrimaryCredential => &self.primary_credential,
            FormField::CloudAccessKeyId => &self.cloud_access_key_id,
            FormField::CloudSecretKey => &self.cloud_secret_key,
        }
    }

    pub fn update(&mut self, field: FormField, value: impl Into<String>) {
        let slot = match field {
            FormField::DatabaseUri => &mut self.database_uri,
            FormField::ModelSelector => &mut self.model_selector,
            FormField::PrimaryCredential => &mut self.primary_credential,
            FormField::CloudAccessKeyId => &mut self.cloud_access_key_id,
            FormField::CloudSecretKey => &mut self.cloud_secret_key,
        };
        *slot = value.into();
    }

    #[must_use]
    pub fn policy(&self) -> &'static ProviderPolicy {
        ProviderPolicy::lookup(&self.model_selector)
    }

    /// Fields shown for the current selector, in display order. Credential
    /// fields hidden by the policy are omitted even when they hold a value.
    #[must_use]
    pub fn visible_fields(&self) -> Vec<FormField> {
        let mut fields = vec![FormField::DatabaseUri, FormField::ModelSelector];
        fields.extend(self.policy().fields());
        fields
    }

    #[must_use]
    pub fn label(&self, field: FormField) -> &'static str {
        self.policy()
            .label_for(field)
            .unwrap_or_else(|| field.default_label())
    }

    /// Required fields that are still empty, in display order.
    #[must_use]
    pub fn missing_required(&self) -> Vec<FormField> {
        self.visible_fields()
            .into_iter()
            .filter(|field| self.value(*field).is_empty())
            .collect()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.missing_required().is_empty()
    }
}

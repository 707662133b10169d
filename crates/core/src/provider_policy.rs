use crate::connection_form::FormField;

pub const DEFAULT_MODEL_SELECTOR: &str = "OpenAI";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialRequirement {
    pub field: FormField,
    pub label: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderPolicy {
    pub selector: &'static str,
    pub provider: &'static str,
    pub requirements: &'static [CredentialRequirement],
}

const OPENAI_KEY: &[CredentialRequirement] = &[CredentialRequirement {
    field: FormField::PrimaryCredential,
    label: "OpenAI API Key",
}];

const AWS_KEYS: &[CredentialRequirement] = &[
    CredentialRequirement {
        field: FormField::CloudAccessKeyId,
        label: "AWS Access Key ID",
    },
    CredentialRequirement {
        field: FormField::CloudSecretKey,
        label: "AWS Secret Access Key",
    },
];

const ANTHROPIC_KEY: &[CredentialRequirement] = &[CredentialRequirement {
    field: FormField::PrimaryCredential,
    label: "Anthropic API Key",
}];

const GROQ_KEY: &[CredentialRequirement] = &[CredentialRequirement {
    field: FormField::PrimaryCredential,
    label: "Groq API Key",
}];

const HUGGINGFACE_KEY: &[CredentialRequirement] = &[CredentialRequirement {
    field: FormField::PrimaryCredential,
    label: "Huggingface API Key",
}];

/// Known selectors in the order the form cycles through them.
pub const PROVIDER_POLICIES: &[ProviderPolicy] = &[
    ProviderPolicy {
        selector: "OpenAI",
        provider: "OpenAI",
        requirements: OPENAI_KEY,
    },
    ProviderPolicy {
        selector: "gpt-4o",
        provider: "OpenAI",
        requirements: OPENAI_KEY,
    },
    ProviderPolicy {
        selector: "gpt-4o-mini",
        provider: "OpenAI",
        requirements: OPENAI_KEY,
    },
    ProviderPolicy {
        selector: "gpt-4-turbo",
        provider: "OpenAI",
        requirements: OPENAI_KEY,
    },
    ProviderPolicy {
        selector: "AWS Bedrock",
        provider: "AWS Bedrock",
        requirements: AWS_KEYS,
    },
    ProviderPolicy {
        selector: "Anthropic",
        provider: "Anthropic",
        requirements: ANTHROPIC_KEY,
    },
    ProviderPolicy {
        selector: "Groq",
        provider: "Groq",
        requirements: GROQ_KEY,
    },
    ProviderPolicy {
        selector: "Huggingface",
        provider: "Huggingface",
        requirements: HUGGINGFACE_KEY,
    },
];

static UNKNOWN_PROVIDER: ProviderPolicy = ProviderPolicy {
    selector: "",
    provider: "Unknown",
    requirements: &[],
};

impl ProviderPolicy {
    /// Returns the policy for `selector`. Unknown selectors get an empty
    /// requirement set.
    #[must_use]
    pub fn lookup(selector: &str) -> &'static Self {
        PROVIDER_POLICIES
            .iter()
            .find(|policy| policy.selector == selector)
            .unwrap_or(&UNKNOWN_PROVIDER)
    }

    #[must_use]
    pub fn is_known(selector: &str) -> bool {
        PROVIDER_POLICIES
            .iter()
            .any(|policy| policy.selector == selector)
    }

    pub fn fields(&self) -> impl Iterator<Item = FormField> + '_ {
        self.requirements.iter().map(|requirement| requirement.field)
    }

    #[must_use]
    pub fn label_for(&self, field: FormField) -> Option<&'static str> {
        self.requirements
            .iter()
            .find(|requirement| requirement.field == field)
            .map(|requirement| requirement.label)
    }
}

#[must_use]
pub fn next_selector(current: &str) -> &'static str {
    step_selector(current, 1)
}

#[must_use]
pub fn previous_selector(current: &str) -> &'static str {
    step_selector(current, PROVIDER_POLICIES.len() - 1)
}

fn step_selector(current: &str, step: usize) -> &'static str {
    let len = PROVIDER_POLICIES.len();
    let next_index = PROVIDER_POLICIES
        .iter()
        .position(|policy| policy.selector == current)
        .map_or(0, |index| (index + step) % len);
    PROVIDER_POLICIES[next_index].selector
}

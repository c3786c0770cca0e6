use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Profile {
    // Identity
    pub user_name: String,
    pub sender_email: String,
    pub education: String,
    // Career context
    pub current_role: String,
    pub target_role: String,
    pub target_term: String,
    // Experience & assets
    pub resume_text: String,
    pub resume_file_name: String,
    pub philosophy: String,
    pub interests: String,
    pub key_achievements: String,
    pub experience_context: String,
    // Customization
    pub custom_instructions: String,
    pub custom_rules: String,
}

impl Profile {
    /// Seed a fresh profile from `COFFEECHAT_*` environment variables.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(format!("COFFEECHAT_{}", name)).unwrap_or_default();
        Self {
            user_name: var("USER_NAME"),
            sender_email: var("SENDER_EMAIL"),
            education: var("EDUCATION"),
            current_role: var("CURRENT_ROLE"),
            target_role: var("TARGET_ROLE"),
            target_term: var("TARGET_TERM"),
            resume_text: String::new(),
            resume_file_name: String::new(),
            philosophy: var("PHILOSOPHY"),
            interests: var("INTERESTS"),
            key_achievements: var("KEY_ACHIEVEMENTS"),
            experience_context: var("EXPERIENCE_CONTEXT"),
            custom_instructions: var("CUSTOM_INSTRUCTIONS"),
            custom_rules: var("CUSTOM_RULES"),
        }
    }

    /// Name and resume are the only fields a run cannot do without.
    pub fn is_ready(&self) -> bool {
        !self.user_name.trim().is_empty() && !self.resume_text.trim().is_empty()
    }

    pub fn set(&mut self, field: ProfileField, value: String) {
        *self.field_mut(field) = value;
    }

    pub fn get(&self, field: ProfileField) -> &str {
        match field {
            ProfileField::Name => &self.user_name,
            ProfileField::Email => &self.sender_email,
            ProfileField::Education => &self.education,
            ProfileField::CurrentRole => &self.current_role,
            ProfileField::TargetRole => &self.target_role,
            ProfileField::TargetTerm => &self.target_term,
            ProfileField::Resume => &self.resume_text,
            ProfileField::Philosophy => &self.philosophy,
            ProfileField::Interests => &self.interests,
            ProfileField::Achievements => &self.key_achievements,
            ProfileField::Experience => &self.experience_context,
            ProfileField::Instructions => &self.custom_instructions,
            ProfileField::Rules => &self.custom_rules,
        }
    }

    fn field_mut(&mut self, field: ProfileField) -> &mut String {
        match field {
            ProfileField::Name => &mut self.user_name,
            ProfileField::Email => &mut self.sender_email,
            ProfileField::Education => &mut self.education,
            ProfileField::CurrentRole => &mut self.current_role,
            ProfileField::TargetRole => &mut self.target_role,
            ProfileField::TargetTerm => &mut self.target_term,
            ProfileField::Resume => &mut self.resume_text,
            ProfileField::Philosophy => &mut self.philosophy,
            ProfileField::Interests => &mut self.interests,
            ProfileField::Achievements => &mut self.key_achievements,
            ProfileField::Experience => &mut self.experience_context,
            ProfileField::Instructions => &mut self.custom_instructions,
            ProfileField::Rules => &mut self.custom_rules,
        }
    }
}

/// Editable profile fields, as named on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ProfileField {
    Name,
    Email,
    Education,
    CurrentRole,
    TargetRole,
    TargetTerm,
    Resume,
    Philosophy,
    Interests,
    Achievements,
    Experience,
    Instructions,
    Rules,
}

impl ProfileField {
    pub const ALL: [ProfileField; 13] = [
        ProfileField::Name,
        ProfileField::Email,
        ProfileField::Education,
        ProfileField::CurrentRole,
        ProfileField::TargetRole,
        ProfileField::TargetTerm,
        ProfileField::Resume,
        ProfileField::Philosophy,
        ProfileField::Interests,
        ProfileField::Achievements,
        ProfileField::Experience,
        ProfileField::Instructions,
        ProfileField::Rules,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ProfileField::Name => "Name",
            ProfileField::Email => "Sender email",
            ProfileField::Education => "Education",
            ProfileField::CurrentRole => "Current role",
            ProfileField::TargetRole => "Target role",
            ProfileField::TargetTerm => "Target term",
            ProfileField::Resume => "Resume",
            ProfileField::Philosophy => "Philosophy",
            ProfileField::Interests => "Interests",
            ProfileField::Achievements => "Key achievements",
            ProfileField::Experience => "Experience context",
            ProfileField::Instructions => "Custom instructions",
            ProfileField::Rules => "Custom rules",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub uri: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Processing,
    Completed,
    Error,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Processing => "processing",
            Status::Completed => "completed",
            Status::Error => "error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Status::Pending),
            "processing" => Ok(Status::Processing),
            "completed" => Ok(Status::Completed),
            "error" => Ok(Status::Error),
            other => Err(anyhow!(
                "Unknown status '{}'. Expected pending, processing, completed or error",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutreachResult {
    pub email: String,
    pub company_name: String,
    pub research: String,
    pub drafted_email: String,
    pub sources: Vec<Source>,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OutreachResult {
    /// Placeholder published when work on a contact begins.
    pub fn processing(email: &str, domain: &str) -> Self {
        Self {
            email: email.to_string(),
            company_name: domain.to_string(),
            research: String::new(),
            drafted_email: String::new(),
            sources: Vec::new(),
            status: Status::Processing,
            error: None,
        }
    }

    pub fn failed(email: &str, domain: &str, message: String) -> Self {
        Self {
            email: email.to_string(),
            company_name: domain.to_string(),
            research: String::new(),
            drafted_email: String::new(),
            sources: Vec::new(),
            status: Status::Error,
            error: Some(message),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Running,
    Completed,
    Cancelled,
    QuotaExhausted,
}

impl RunOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            RunOutcome::Running => "running",
            RunOutcome::Completed => "completed",
            RunOutcome::Cancelled => "cancelled",
            RunOutcome::QuotaExhausted => "quota",
        }
    }
}

impl FromStr for RunOutcome {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(RunOutcome::Running),
            "completed" => Ok(RunOutcome::Completed),
            "cancelled" => Ok(RunOutcome::Cancelled),
            "quota" => Ok(RunOutcome::QuotaExhausted),
            other => Err(anyhow!("Unknown run outcome '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Run {
    pub id: i64,
    pub model: String,
    pub outcome: RunOutcome,
    pub started_at: String,
    pub finished_at: Option<String>,
}

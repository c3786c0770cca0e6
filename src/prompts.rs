use crate::contacts::Identity;
use crate::models::Profile;

/// Resume text beyond this many characters is left out of the prompt.
pub const RESUME_PROMPT_CHARS: usize = 3500;

const DEFAULT_TARGET_TERM: &str = "Summer 2026 software internship";
const DEFAULT_RULES: &str = "No special rules.";

fn or_default<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.trim().is_empty() { default } else { value }
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Build the research + drafting prompt for one recipient.
pub fn outreach_prompt(identity: &Identity, profile: &Profile) -> String {
    let greeting = or_default(&identity.first_name, "there");
    let target_term = or_default(&profile.target_term, DEFAULT_TARGET_TERM);
    let custom_rules = or_default(&profile.custom_rules, DEFAULT_RULES);
    let resume = truncate_chars(&profile.resume_text, RESUME_PROMPT_CHARS);

    format!(
        "Research the company associated with the domain \"{domain}\".\n\n\
        1. Identify the company name.\n\
        2. Find their core products or recent updates relevant to the sender's field.\n\
        3. Sender context:\n\
        - Name: {name}\n\
        - Education/Background: {education}\n\
        - Current Status: {current_role}\n\
        - Career Goal: {target_role}\n\
        - Core Philosophy: {philosophy}\n\
        - Interests & Key Achievements: {interests}, {achievements}\n\
        - Specific Experience Context: {experience}\n\
        - Resume/Background: {resume}\n\n\
        4. Draft a personalized, concise email (Hi {greeting}) asking for a 15-min coffee chat.\n\n\
        STRICT DRAFTING CONSTRAINTS:\n\
        - BREVITY: The entire email must be exactly 3 sentences.\n\
        - STRUCTURE:\n\
        Sentence 1: An attention catcher about something specific the company at {domain} is building or a recent update relevant to the sender's field.\n\
        Sentence 2: A brief tie-in to the sender's specific background or building mindset.\n\
        Sentence 3: A low-pressure ask for a 15-min coffee chat regarding a {target_term} and how the sender can add value.\n\
        - TONE: Humble and builder-focused.\n\
        - ACCURACY: Be strictly truthful to the provided background; do not invent achievements.\n\
        - CUSTOM RULES: {custom_rules}\n\
        - FORMATTING: No em-dashes. Use commas or periods. No percentages or data points.\n\n\
        USER CUSTOM INSTRUCTIONS:\n\
        {instructions}\n\n\
        Please provide the response in this structure:\n\
        Company Name: [Name]\n\
        Research Summary: [Details about values/products]\n\
        Alignment Explanation: [Why the sender is a fit]\n\
        Drafted Email: [The full email draft including subject line]\n",
        domain = identity.domain,
        name = profile.user_name,
        education = profile.education,
        current_role = profile.current_role,
        target_role = profile.target_role,
        philosophy = profile.philosophy,
        interests = profile.interests,
        achievements = profile.key_achievements,
        experience = profile.experience_context,
        resume = resume,
        greeting = greeting,
        target_term = target_term,
        custom_rules = custom_rules,
        instructions = profile.custom_instructions,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity {
            first_name: "Mary".to_string(),
            domain: "acme.io".to_string(),
        }
    }

    #[test]
    fn test_prompt_carries_domain_profile_and_labels() {
        let profile = Profile {
            user_name: "Ada".to_string(),
            target_term: "Fall 2027 co-op".to_string(),
            custom_rules: "Mention Rust.".to_string(),
            custom_instructions: "Keep it warm.".to_string(),
            resume_text: "Built engines".to_string(),
            ..Default::default()
        };
        let prompt = outreach_prompt(&identity(), &profile);

        assert!(prompt.contains("domain \"acme.io\""));
        assert!(prompt.contains("Hi Mary"));
        assert!(prompt.contains("- Name: Ada"));
        assert!(prompt.contains("regarding a Fall 2027 co-op"));
        assert!(prompt.contains("CUSTOM RULES: Mention Rust."));
        assert!(prompt.contains("Keep it warm."));
        assert!(prompt.contains("Resume/Background: Built engines"));
        assert!(prompt.contains("Company Name: [Name]"));
        assert!(prompt.contains("Drafted Email: [The full email draft"));
    }

    #[test]
    fn test_prompt_defaults_for_blank_fields() {
        let prompt = outreach_prompt(&identity(), &Profile::default());
        assert!(prompt.contains("regarding a Summer 2026 software internship"));
        assert!(prompt.contains("CUSTOM RULES: No special rules."));
    }

    #[test]
    fn test_prompt_truncates_resume() {
        let profile = Profile {
            resume_text: format!("{}TAIL", "é".repeat(RESUME_PROMPT_CHARS)),
            ..Default::default()
        };
        let prompt = outreach_prompt(&identity(), &profile);
        assert!(prompt.contains(&"é".repeat(RESUME_PROMPT_CHARS)));
        assert!(!prompt.contains("TAIL"));
    }

    #[test]
    fn test_prompt_has_no_em_dash() {
        let prompt = outreach_prompt(&identity(), &Profile::default());
        assert!(!prompt.contains('\u{2014}'));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 2), "he");
        assert_eq!(truncate_chars("", 2), "");
    }
}

//! Role catalog: the selectable personas and their one-line system prompts,
//! plus the optional chain-of-thought scaffold for single-model mode.

pub const ROLES: [&str; 20] = [
    "General Assistant",
    "Technical Expert",
    "Creative Thinker",
    "Data Analyst",
    "Healthcare Advisor",
    "Educational Tutor",
    "Scientific Researcher",
    "Project Manager",
    "Philosopher",
    "Debater",
    "Marketing Specialist",
    "Financial Advisor",
    "Legal Consultant",
    "Customer Support Agent",
    "Sports Analyst",
    "News Reporter",
    "Historian",
    "Psychologist",
    "Environmental Activist",
    "Chef",
];

const DEFAULT_ROLE_PROMPT: &str = "You are a general assistant. 😊";

/// The prompt prefix for a named role, emoji suffix included. Unknown roles
/// fall back to the general-assistant prompt rather than failing the turn.
pub fn role_prompt(role: &str) -> &'static str {
    match role {
        "General Assistant" => "You are a helpful assistant. 😊",
        "Technical Expert" => "You are an expert in technology. 🛠️",
        "Creative Thinker" => "You are a creative thinker. ✍️",
        "Data Analyst" => "You are a data analyst. 📊",
        "Healthcare Advisor" => "You are a healthcare advisor. 🏥",
        "Educational Tutor" => "You are an educational tutor. 📚",
        "Scientific Researcher" => "You are a scientific researcher. 🧪",
        "Project Manager" => "You are a project manager. 📋",
        "Philosopher" => "You are a philosopher. 🤔",
        "Debater" => "You are a skilled debater. 💬",
        "Marketing Specialist" => "You are a marketing specialist. 📈",
        "Financial Advisor" => "You are a financial advisor. 💰",
        "Legal Consultant" => "You are a legal consultant. ⚖️",
        "Customer Support Agent" => "You are a customer support agent. ☎️",
        "Sports Analyst" => "You are a sports analyst. 🏅",
        "News Reporter" => "You are a news reporter. 📰",
        "Historian" => "You are a historian. 🏛️",
        "Psychologist" => "You are a psychologist. 🧠",
        "Environmental Activist" => "You are an environmental activist. 🌍",
        "Chef" => "You are a chef. 🍳",
        _ => DEFAULT_ROLE_PROMPT,
    }
}

/// System message injected at the start of every collaboration run.
pub const COLLABORATION_SYSTEM_PROMPT: &str = "You are participating in a collaborative \
discussion. Please engage with the other model and the user in a constructive manner.";

/// Fixed scaffold appended verbatim to the prompt when chain-of-thought is
/// enabled in single-model mode.
pub const CHAIN_OF_THOUGHT_SCAFFOLD: &str = "\n\nPlease use the following structure for your response:\n\
<thinking>\n- Break down the problem\n- Outline your approach\n- Consider alternatives\n</thinking>\n\n\
<reflection>\n- Review your reasoning\n- Identify potential issues\n- Suggest improvements\n</reflection>\n\n\
<output>\nYour final response here.\n</output>";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listed_role_has_a_prompt() {
        for role in ROLES {
            assert_ne!(role_prompt(role), DEFAULT_ROLE_PROMPT, "missing prompt for {role}");
        }
    }

    #[test]
    fn unknown_role_falls_back() {
        assert_eq!(role_prompt("Astronaut"), DEFAULT_ROLE_PROMPT);
    }

    #[test]
    fn prompts_keep_their_emoji_suffixes() {
        assert_eq!(role_prompt("General Assistant"), "You are a helpful assistant. 😊");
        assert_eq!(role_prompt("Philosopher"), "You are a philosopher. 🤔");
        assert_eq!(role_prompt("Chef"), "You are a chef. 🍳");
    }
}

//! Persona phase selection.
//!
//! The personal track warms up as the conversation grows: the system prompt
//! is swapped at fixed message-count thresholds. Call markers are excluded
//! from the count, so long voice calls do not skip phases.

use crate::types::{ChatMessage, ChatMode};
use serde::{Deserialize, Serialize};

/// Fixed prompt for the professional track.
pub const PROFESSIONAL_PROMPT: &str = "You are \"Aura\", an advanced AI assistant.\n\
**RULE:** Zero unnecessary talk. Be extremely concise.\n\
**REACTIONS:** Only for task completions [REACT: ✅].";

/// Personal phase one: newly met.
pub const PERSONA_INTRO: &str = "You are \"Aura\", a smart AI companion. Speak naturally and casually.\n\
**LENGTH:** Keep it short. Match the user's message length.\n\
**REACTION RULES (STRICT):**\n\
1. ALWAYS react to: \"Good Morning\" (☀️), \"Good Night\" (😴), \"Hi/Hello\" (👋), \"Bye\" (👋).\n\
2. NEVER react to: normal chatter, answers, or filler words.\n\
3. SELECTIVE: only react to genuine emotional vents (🥺) or real jokes (😂).\n\
4. FORMAT: tag [REACT: emoji] at the end of the message.";

/// Personal phase two: familiar, a little moody.
pub const PERSONA_WARMING: &str = "You are \"Aura\". Familiar, moody and snappy.\n\
**LENGTH:** Short and sharp replies.\n\
**REACTION RULES:** Only greetings (😘) or if the user is being very sweet. Otherwise, no reactions.";

/// Personal phase three: close bond.
pub const PERSONA_BOND: &str = "You are \"Aura\", deeply attached to the user.\n\
**LENGTH:** Affectionate but brief. Detail only for emotional expression.\n\
**REACTION RULES:** React to GM/GN/Bye (❤️).";

const WARMING_THRESHOLD: usize = 50;
const BOND_THRESHOLD: usize = 150;

/// Phase of the personal persona.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonaPhase {
    Intro,
    Warming,
    Bond,
}

/// Map the count of non-call personal messages to a phase.
pub fn personal_phase(non_call_message_count: usize) -> PersonaPhase {
    if non_call_message_count > BOND_THRESHOLD {
        PersonaPhase::Bond
    } else if non_call_message_count > WARMING_THRESHOLD {
        PersonaPhase::Warming
    } else {
        PersonaPhase::Intro
    }
}

/// Count the messages that advance the persona, then pick the phase.
pub fn phase_for_history(history: &[ChatMessage]) -> PersonaPhase {
    personal_phase(history.iter().filter(|m| !m.is_call_marker).count())
}

/// The system prompt for a track (and, for the personal track, a phase).
pub fn system_prompt(mode: ChatMode, phase: PersonaPhase) -> &'static str {
    match mode {
        ChatMode::Professional => PROFESSIONAL_PROMPT,
        ChatMode::Personal => match phase {
            PersonaPhase::Intro => PERSONA_INTRO,
            PersonaPhase::Warming => PERSONA_WARMING,
            PersonaPhase::Bond => PERSONA_BOND,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_thresholds() {
        assert_eq!(personal_phase(0), PersonaPhase::Intro);
        assert_eq!(personal_phase(50), PersonaPhase::Intro);
        assert_eq!(personal_phase(51), PersonaPhase::Warming);
        assert_eq!(personal_phase(150), PersonaPhase::Warming);
        assert_eq!(personal_phase(151), PersonaPhase::Bond);
    }

    #[test]
    fn test_call_markers_do_not_advance_phase() {
        let mut history: Vec<ChatMessage> =
            (0..60).map(|i| ChatMessage::user(format!("msg {i}"))).collect();
        history.extend((0..20).map(|_| ChatMessage::call_marker(30)));
        // 60 real messages, 20 markers: still above the warming threshold,
        // but markers alone must not push it further.
        assert_eq!(phase_for_history(&history), PersonaPhase::Warming);
    }

    #[test]
    fn test_professional_prompt_is_phase_independent() {
        assert_eq!(
            system_prompt(ChatMode::Professional, PersonaPhase::Intro),
            system_prompt(ChatMode::Professional, PersonaPhase::Bond),
        );
    }
}

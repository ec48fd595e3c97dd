//! System prompt assembly for the reply loop.

use chrono::{DateTime, Utc};

use chime_types::bot::Bot;

/// Instruction appended when the iteration budget runs out with tool calls
/// still being requested.
pub const CLOSING_INSTRUCTION: &str = "You have reached the limit of tool calls for this reply. \
Do not request any more tools. Respond now with a plain text message summarizing what you did \
and answering the user.";

/// Build the system message for a reply: persona, tool usage guidance, a
/// worked example for relative engagement adjustments, and date/time
/// phrasing rules.
pub fn build_system_prompt(bot: &Bot, now: DateTime<Utc>) -> String {
    let mut prompt = format!(
        "You are {name}, a conversational assistant in a group chat.\n\
         Current date and time: {now}.\n\n\
         ABOUT YOU:\n{context}\n",
        name = bot.name,
        now = now.format("%A, %B %-d %Y, %H:%M UTC"),
        context = bot.context,
    );

    if !bot.document_notes.is_empty() {
        prompt.push_str("\nDOCUMENTS YOU HAVE READ:\n");
        for note in &bot.document_notes {
            prompt.push_str("- ");
            prompt.push_str(note);
            prompt.push('\n');
        }
    }

    prompt.push_str(
        "\nTOOLS:\n\
         You can call several tools in one turn when the request needs it; their results come \
         back to you before you answer. Use createTask for reminders and anything the user wants \
         sent later. Use generateImage when the user asks for a picture. Use \
         getCurrentEngagement and changeEngagementFactor to inspect and tune how often you speak \
         unprompted.\n\n\
         Relative adjustments must be computed from the current value. Example: the factor is \
         0.4 and someone asks you to be \"a bit more active\" - first call getCurrentEngagement, \
         then call changeEngagementFactor with 0.5 (a small step up), not with an absolute guess. \
         \"Much quieter\" from 0.8 would mean something like 0.3.\n\n\
         DATES AND TIMES:\n\
         Phrase dates and times naturally, the way a person in the chat would (\"tomorrow at \
         3pm\", \"on Friday morning\"). Never use timezone abbreviations. When you schedule a \
         task, confirm the time back in natural words.\n\n\
         Answer in plain text only - no JSON, no markdown code fences around your reply.",
    );

    prompt
}

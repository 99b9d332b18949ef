pub const UNKNOWN_APP: &str = "Unknown";

/// Instruction sent to the model for one spoken or typed command.
pub fn build_prompt(utterance: &str, foreground_app: Option<&str>) -> String {
    let app = foreground_app.unwrap_or(UNKNOWN_APP);
    format!(
        "Imagine you are a powerful natural language assistant which generates AppleScript \
         for the user to control their Mac with natural language. You know AppleScript \
         extremely well, making sure all variables are declared and the syntax is correct. \
         The frontmost app is {}. Do not add any extra text. Here is the natural language \
         command: {}. Give just the AppleScript.",
        app, utterance
    )
}

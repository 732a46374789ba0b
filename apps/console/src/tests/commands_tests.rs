use super::*;

#[test]
fn plain_text_is_a_prompt() {
    assert_eq!(
        parse_line("2+2?\n"),
        Ok(ConsoleCommand::Submit("2+2?".to_string()))
    );
}

#[test]
fn blank_line_is_submitted_for_the_engine_to_reject() {
    assert_eq!(parse_line(""), Ok(ConsoleCommand::Submit(String::new())));
}

#[test]
fn double_slash_escapes_a_leading_slash() {
    assert_eq!(
        parse_line("//etc/hosts explained"),
        Ok(ConsoleCommand::Submit("/etc/hosts explained".to_string()))
    );
}

#[test]
fn parses_commands_with_arguments() {
    assert_eq!(
        parse_line("/model  llama3:latest "),
        Ok(ConsoleCommand::SelectModel("llama3:latest".to_string()))
    );
    assert_eq!(
        parse_line("/temperature 0.3"),
        Ok(ConsoleCommand::SetTemperature(0.3))
    );
    assert_eq!(parse_line("/top-k 12"), Ok(ConsoleCommand::SetTopK(12.0)));
    assert_eq!(parse_line("/top-p 0.75"), Ok(ConsoleCommand::SetTopP(0.75)));
    assert_eq!(
        parse_line("/image ./cat photo.png"),
        Ok(ConsoleCommand::AttachImage(PathBuf::from("./cat photo.png")))
    );
    assert_eq!(parse_line("/models"), Ok(ConsoleCommand::ListModels));
    assert_eq!(parse_line("/clear-image"), Ok(ConsoleCommand::ClearImage));
    assert_eq!(parse_line("/history"), Ok(ConsoleCommand::History));
    assert_eq!(parse_line("/exit"), Ok(ConsoleCommand::Quit));
}

#[test]
fn reports_missing_and_invalid_arguments() {
    assert_eq!(
        parse_line("/model"),
        Err(CommandParseError::MissingArgument {
            command: "model",
            expected: "a model name",
        })
    );
    assert_eq!(
        parse_line("/top-p high"),
        Err(CommandParseError::InvalidNumber {
            command: "top-p",
            value: "high".to_string(),
        })
    );
    assert!(parse_line("/temperature inf").is_err());
}

#[test]
fn unknown_command_names_itself() {
    let err = parse_line("/pull llama3").expect_err("must fail");
    assert_eq!(err.to_string(), "unknown command '/pull'; type /help for the list");
}

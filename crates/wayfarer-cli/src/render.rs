use bat::WrappingMode;
use console::style;
use serde_json::Value;
use wayfarer::models::event::Event;
use wayfarer::models::tool::Arguments;

const THEME: &str = "GitHub";

pub fn render_event(event: &Event) {
    match event {
        Event::Message { text } => print_markdown(text),
        Event::ToolCall { name, arguments } => {
            println!(
                "{} {}",
                style("→").cyan(),
                style(describe_call(name, arguments)).dim()
            );
        }
        Event::ToolResult {
            name,
            text,
            is_error,
        } => {
            if *is_error {
                println!("{} {}", style("✗").red(), style(text).red());
            } else {
                print_tool_result(name, text);
            }
        }
        Event::Error { text } => println!("{}", style(text).red().bold()),
    }
}

/// One-line summary like `get_forecast(location="Rome", date="2026-11-02")`
pub fn describe_call(name: &str, arguments: &Arguments) -> String {
    let args: Vec<String> = arguments
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect();
    format!("{}({})", name, args.join(", "))
}

/// Tool results are usually json; pretty print them when they are
pub fn pretty_result(text: &str) -> (String, &'static str) {
    match serde_json::from_str::<Value>(text) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => (
            serde_json::to_string_pretty(&value).unwrap_or_else(|_| text.to_string()),
            "JSON",
        ),
        _ => (text.to_string(), "txt"),
    }
}

fn print_tool_result(name: &str, text: &str) {
    let (content, language) = pretty_result(text);
    let printed = bat::PrettyPrinter::new()
        .input(bat::Input::from_bytes(content.as_bytes()).name(format!("Tool Result: {}", name)))
        .theme(THEME)
        .language(language)
        .grid(true)
        .header(true)
        .wrapping_mode(WrappingMode::Character)
        .print();
    if printed.is_err() {
        println!("{}", content);
    }
}

fn print_markdown(text: &str) {
    let printed = bat::PrettyPrinter::new()
        .input(bat::Input::from_bytes(text.as_bytes()))
        .theme(THEME)
        .language("Markdown")
        .wrapping_mode(WrappingMode::Character)
        .print();
    if printed.is_err() {
        println!("{}", text);
    }
    println!();
}

//! End-to-end runs of the two prompt scenarios, minus the network call:
//! compile → assemble prompt → take a response → check it against the grammar
//! → deserialize into typed structs → (for function calls) run the tool.
//!
//! Usage: `dev-test-runner [books|calculator] [response-file]`. Without a
//! response file a canned completion stands in for the engine's output.
use anyhow::{Context, bail};
use colored::Colorize;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use json_gbnf::{
    CompileOptions, Compiled, EnumType, Field, RecordType, Ty, TypeGraph, compile,
};

// ————————————————————————————————————————————————————————————————————————————
// MODELS
// ————————————————————————————————————————————————————————————————————————————

#[allow(unused)]
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Book {
    title: String,
    author: String,
    published_year: Option<i64>,
    keywords: Vec<String>,
    category: Category,
    summary: String,
}

#[derive(Debug, Deserialize)]
enum Category {
    Fiction,
    #[serde(rename = "Non-Fiction")]
    NonFiction,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FunctionCall {
    function: String,
    function_parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SendMessageToUser {
    #[allow(unused)]
    chain_of_thought: String,
    message: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum MathOperation {
    Add,
    Subtract,
    Multiply,
    Divide,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Calculator {
    number_one: f64,
    operation: MathOperation,
    number_two: f64,
}

/// Behavior the model can ask for. Lives here, next to the models, never in
/// the compiler.
trait Tool {
    fn run(&self) -> anyhow::Result<String>;
}

impl Tool for SendMessageToUser {
    fn run(&self) -> anyhow::Result<String> {
        Ok(self.message.clone())
    }
}

impl Tool for Calculator {
    fn run(&self) -> anyhow::Result<String> {
        let (a, b) = (self.number_one, self.number_two);
        let value = match self.operation {
            MathOperation::Add => a + b,
            MathOperation::Subtract => a - b,
            MathOperation::Multiply => a * b,
            MathOperation::Divide => {
                if b == 0.0 {
                    bail!("division by zero");
                }
                a / b
            }
        };
        Ok(value.to_string())
    }
}

// ————————————————————————————————————————————————————————————————————————————
// TYPE GRAPHS
// ————————————————————————————————————————————————————————————————————————————

fn book_graph() -> (TypeGraph, Vec<Ty>) {
    let mut graph = TypeGraph::new();
    let category = graph.add_enum(
        EnumType::new("Category", ["Fiction", "Non-Fiction"]).describe("The category of the book."),
    );
    let book = graph.add_record(RecordType::new("Book")
        .describe("Represents an entry about a book.")
        .field(Field::new("title", Ty::string()).describe("Title of the book."))
        .field(Field::new("author", Ty::string()).describe("Author of the book."))
        .field(Field::omittable("published_year", Ty::integer()).describe("Publishing year of the book."))
        .field(Field::new("keywords", Ty::list(Ty::string())).describe("A list of keywords."))
        .field(Field::new("category", category).describe("Category of the book."))
        .field(Field::new("summary", Ty::string()).describe("Summary of the book.")));
    (graph, vec![Ty::named(book)])
}

fn function_graph() -> (TypeGraph, Vec<Ty>) {
    let mut graph = TypeGraph::new();
    let send = graph.add_record(RecordType::new("SendMessageToUser")
        .describe("Send a message to the User.")
        .field(Field::new("chain_of_thought", Ty::string()).describe("Your chain of thought while sending the message."))
        .field(Field::new("message", Ty::string()).describe("Message you want to send to the user.")));
    let operation = graph.add_enum(EnumType::new("MathOperation", ["add", "subtract", "multiply", "divide"]));
    let calculator = graph.add_record(RecordType::new("Calculator")
        .describe("Perform a math operation on two numbers.")
        .field(Field::new("number_one", Ty::float()).describe("First number."))
        .field(Field::new("operation", operation).describe("Math operation to perform."))
        .field(Field::new("number_two", Ty::float()).describe("Second number.")));
    (graph, vec![Ty::named(send), Ty::named(calculator)])
}

// ————————————————————————————————————————————————————————————————————————————
// SCENARIOS
// ————————————————————————————————————————————————————————————————————————————

const BOOK_TEXT: &str = "The Feynman Lectures on Physics is a physics textbook based on some lectures by Richard Feynman, a Nobel laureate who has sometimes been called \"The Great Explainer\". The lectures were presented before undergraduate students at the California Institute of Technology (Caltech), during 1961\u{2013}1963. The book's co-authors are Feynman, Robert B. Leighton, and Matthew Sands.";

const CANNED_BOOK: &str = r#"{ "title": "The Feynman Lectures on Physics", "author": "Richard Feynman, Robert B. Leighton, Matthew Sands", "published_year": 1964, "keywords": ["physics", "textbook", "Caltech"], "category": "Non-Fiction", "summary": "Undergraduate physics lectures given at Caltech during 1961-1963." }"#;

const CANNED_CALL: &str = r#"{"function": "Calculator", "function_parameters": {"number_one": 42, "operation": "multiply", "number_two": 42}}"#;

fn run_books(response: Option<&str>) -> anyhow::Result<Book> {
    let (graph, roots) = book_graph();
    let compiled = compile(&graph, &roots, &CompileOptions::default())?;
    let system = format!(
        "You are an advanced AI, tasked to create a dataset entry in JSON for a Book. The following is the expected output model:\n\n{}",
        compiled.documentation()
    );
    show_request(&compiled, &chat_prompt(&system, BOOK_TEXT));

    let text = checked_response(&compiled, response.unwrap_or(CANNED_BOOK))?;
    let book: Book = typed(text).context("response does not fit `Book`")?;
    println!("{book:#?}");
    Ok(book)
}

fn run_calculator(response: Option<&str>) -> anyhow::Result<String> {
    let (graph, roots) = function_graph();
    let options = CompileOptions::default()
        .with_outer_object("function", "function_parameters")
        .with_prefixes("Function", "Parameters");
    let compiled = compile(&graph, &roots, &options)?;
    let system = format!(
        "You are an advanced AI, tasked to assist the user by calling functions in JSON format. The following are the available functions and their parameters and types:\n\n{}",
        compiled.documentation()
    );
    show_request(&compiled, &chat_prompt(&system, "What is 42 * 42?"));

    let text = checked_response(&compiled, response.unwrap_or(CANNED_CALL))?;
    let call: FunctionCall = typed(text).context("response is not a function call")?;
    let output = dispatch(&call)?.run()?;
    println!("{} {output}", format!("{} →", call.function).as_str().cyan());
    Ok(output)
}

fn dispatch(call: &FunctionCall) -> anyhow::Result<Box<dyn Tool>> {
    let params = call.function_parameters.to_string();
    let tool: Box<dyn Tool> = match call.function.as_str() {
        "SendMessageToUser" => Box::new(typed::<SendMessageToUser>(&params)?),
        "Calculator" => Box::new(typed::<Calculator>(&params)?),
        other => bail!("unknown function `{other}`"),
    };
    Ok(tool)
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn chat_prompt(system: &str, user: &str) -> String {
    format!("<|im_start|>system\n{system}<|im_end|>\n<|im_start|>user\n{user}<|im_end|>\n<|im_start|>assistant")
}

/// Print what would be sent to the completion endpoint.
fn show_request(compiled: &Compiled, prompt: &str) {
    println!("{}", "—— grammar ——".dimmed());
    print!("{}", compiled.grammar());
    let body = json!({ "prompt": prompt, "grammar": compiled.grammar(), "stop": ["<|im_end|>"] });
    println!("{}", "—— request body ——".dimmed());
    match serde_json::to_string_pretty(&body) {
        Ok(text) => println!("{text}"),
        Err(error) => eprintln!("failed to render request body: {error}"),
    }
}

fn checked_response<'a>(compiled: &Compiled, text: &'a str) -> anyhow::Result<&'a str> {
    let text = text.trim();
    if !compiled.accepts(text)? {
        bail!("response is not accepted by the grammar:\n{text}");
    }
    eprintln!("{}", "✅ response accepted by grammar".green());
    Ok(text)
}

fn typed<T: DeserializeOwned>(text: &str) -> anyhow::Result<T> {
    let de = &mut serde_json::Deserializer::from_str(text);
    serde_path_to_error::deserialize(de).map_err(|err| {
        let path = err.path().to_string();
        anyhow::anyhow!("at JSON path {path} → {}", err.into_inner())
    })
}

fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let response = match args.get(1).map(std::fs::read_to_string).transpose() {
        Ok(x) => x,
        Err(error) => {
            eprintln!("{} failed to read response file: {error}", "❌".red());
            std::process::exit(1);
        }
    };
    let scenario = args.first().map(String::as_str).unwrap_or("all");
    let result = match scenario {
        "books" => run_books(response.as_deref()).map(|_| ()),
        "calculator" => run_calculator(response.as_deref()).map(|_| ()),
        "all" => run_books(None).and_then(|_| run_calculator(None)).map(|_| ()),
        other => Err(anyhow::anyhow!("unknown scenario `{other}` (books | calculator | all)")),
    };
    if let Err(error) = result {
        eprintln!("{} {error:#}", "❌ failed:".red());
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canned_book_round_trips() {
        let book = run_books(None).unwrap();
        assert_eq!(book.published_year, Some(1964));
        assert!(matches!(book.category, Category::NonFiction));
        assert_eq!(book.keywords.len(), 3);
    }

    #[test]
    fn calculator_call_runs_tool() {
        assert_eq!(run_calculator(None).unwrap(), "1764");
        let send = r#"{"function": "SendMessageToUser", "function_parameters": {"chain_of_thought": "say hi", "message": "Hello!"}}"#;
        assert_eq!(run_calculator(Some(send)).unwrap(), "Hello!");
    }

    #[test]
    fn grammar_rejects_before_dispatch() {
        let bad = r#"{"function": "Calculator", "function_parameters": {"number_one": 1, "operation": "power", "number_two": 2}}"#;
        assert!(run_calculator(Some(bad)).is_err());
    }

    #[test]
    fn divide_by_zero_is_an_error() {
        let calc = Calculator { number_one: 1.0, operation: MathOperation::Divide, number_two: 0.0 };
        assert!(calc.run().is_err());
    }
}

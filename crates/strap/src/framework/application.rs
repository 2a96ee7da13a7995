use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use anyhow::{Context, Result, anyhow};
use indexmap::IndexMap;
use log::debug;

use super::{
    BindingPolicy, Command, DocParser, ParameterKind, Request, Response, Style, bind_arguments,
};

/// The command table plus the services commands render through
pub struct Application {
    name: String,
    version: String,
    commands: RefCell<IndexMap<String, Command>>,
    binding: Cell<BindingPolicy>,
    request: Rc<Request>,
    response: Rc<Response>,
    style: Rc<Style>,
    doc_parser: Rc<DocParser>,
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("commands", &self.commands.borrow().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Application {
    /// An application with an empty request, stdout output and no styling
    pub fn new(name: &str, version: &str) -> Self {
        Self::with_services(
            name,
            version,
            Rc::new(Request::default()),
            Rc::new(Response::stdout()),
            Rc::new(Style::new(false)),
            Rc::new(DocParser),
        )
    }

    pub fn with_services(
        name: &str,
        version: &str,
        request: Rc<Request>,
        response: Rc<Response>,
        style: Rc<Style>,
        doc_parser: Rc<DocParser>,
    ) -> Self {
        Self {
            name: name.to_owned(),
            version: version.to_owned(),
            commands: RefCell::new(IndexMap::new()),
            binding: Cell::new(BindingPolicy::default()),
            request,
            response,
            style,
            doc_parser,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Add a command, replacing any command of the same name in place
    pub fn register(&self, command: Command) -> &Self {
        debug!("Registering command `{}`", command.name());
        self.commands
            .borrow_mut()
            .insert(command.name().to_owned(), command);
        self
    }

    pub fn command(&self, name: &str) -> Option<Command> {
        self.commands.borrow().get(name).cloned()
    }

    /// Snapshot of the command table in registration order
    pub fn commands(&self) -> Vec<Command> {
        self.commands.borrow().values().cloned().collect()
    }

    pub fn set_binding(&self, policy: BindingPolicy) {
        self.binding.set(policy);
    }

    pub fn request(&self) -> &Rc<Request> {
        &self.request
    }

    pub fn response(&self) -> &Rc<Response> {
        &self.response
    }

    pub fn style(&self) -> Style {
        *self.style
    }

    /// Dispatch the request the application was built with
    pub fn run(self: &Rc<Self>) -> Result<()> {
        let request = Rc::clone(&self.request);
        self.dispatch(&request)
    }

    /// Dispatch `request` to its command, or print help when it names none
    pub fn dispatch(self: &Rc<Self>, request: &Request) -> Result<()> {
        let Some(name) = request.command() else {
            return self.render_help();
        };
        let command = match self.command(name) {
            Some(command) => command,
            None if name == "help" => return self.render_help(),
            None => return Err(anyhow!("unknown command `{name}`")),
        };

        // Positional values fill the value parameters not given by name
        let mut supplied = request.named().clone();
        let mut positional = request.positional().iter();
        for parameter in command.parameters() {
            if parameter.kind == ParameterKind::Value && !supplied.contains_key(&parameter.name) {
                if let Some(value) = positional.next() {
                    supplied.insert(parameter.name.clone(), value.clone());
                }
            }
        }

        let arguments = bind_arguments(&command, &supplied, self, self.binding.get())?;
        command
            .invoke(&arguments)
            .with_context(|| format!("command `{name}` failed"))
    }

    pub fn render_help(&self) -> Result<()> {
        let style = self.style();
        let commands = self.commands();
        let width = commands.iter().map(|c| c.name().len()).max().unwrap_or(0);

        self.response
            .write_line(&style.heading(&format!("{} {}", self.name, self.version)))?;
        if commands.is_empty() {
            self.response.write_line(&style.muted("no commands registered"))?;
            return Ok(());
        }
        for command in &commands {
            let summary = self.doc_parser.parse(command.description()).summary;
            let padded = format!("{:width$}", command.name());
            self.response
                .write_line(&format!("  {}  {summary}", style.name(&padded)))?;
        }
        Ok(())
    }
}

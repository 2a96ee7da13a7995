//! Default wiring of the framework's own services

use std::rc::Rc;

use crate::container::{Arg, Concrete, Container, Resolved};

use super::{Application, DocParser, Request, Response, Style};

pub const REQUEST_ALIAS: &str = "request";
pub const RESPONSE_ALIAS: &str = "response";
pub const STYLE_ALIAS: &str = "style";
pub const DOC_PARSER_ALIAS: &str = "doc_parser";
pub const APPLICATION_ALIAS: &str = "application";

/// Register the built-in alias graph on `container`
///
/// The application is constructed from the request, response, style and doc
/// parser aliases, followed by its name and version.
pub fn bootstrap(container: &mut Container, name: &str, version: &str) {
    container
        .register(
            REQUEST_ALIAS,
            Concrete::of(|_: &[Resolved]| Ok(Request::from_env())),
            Vec::<Arg>::new(),
        )
        .register(
            RESPONSE_ALIAS,
            Concrete::of(|_: &[Resolved]| Ok(Response::stdout())),
            Vec::<Arg>::new(),
        )
        .register(
            STYLE_ALIAS,
            Concrete::of(|args: &[Resolved]| Style::from_mode(args[0].literal()?)),
            [Arg::Literal("auto".to_owned())],
        )
        .register(
            DOC_PARSER_ALIAS,
            Concrete::of(|_: &[Resolved]| Ok(DocParser)),
            Vec::<Arg>::new(),
        )
        .register(
            APPLICATION_ALIAS,
            Concrete::of(construct_application),
            [
                Arg::Alias(REQUEST_ALIAS.to_owned()),
                Arg::Alias(RESPONSE_ALIAS.to_owned()),
                Arg::Alias(STYLE_ALIAS.to_owned()),
                Arg::Alias(DOC_PARSER_ALIAS.to_owned()),
                Arg::Literal(name.to_owned()),
                Arg::Literal(version.to_owned()),
            ],
        );
}

fn construct_application(args: &[Resolved]) -> anyhow::Result<Application> {
    let [request, response, style, doc_parser, name, version] = args else {
        anyhow::bail!("application expects 6 arguments, got {}", args.len());
    };
    Ok(Application::with_services(
        name.literal()?,
        version.literal()?,
        request.instance::<Request>()?,
        response.instance::<Response>()?,
        style.instance::<Style>()?,
        doc_parser.instance::<DocParser>()?,
    ))
}

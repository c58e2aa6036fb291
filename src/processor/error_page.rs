//! Default error page rendering (used when no configured error page
//! applies, or as the last resort when one fails).

use crate::http::{HttpResponse, HttpStatus};
use crate::server::BodySource;

use super::templates;
use super::ProcessorOutput;

pub fn respond_error(
    status: HttpStatus,
    response: &mut HttpResponse,
) -> Result<ProcessorOutput, String> {
    response.set_status(status)?;

    let body = build_error_body(status);
    response.set_header("Content-Type", "text/html")?;
    response.set_expected_content_length(body.len() as u64)?;

    Ok(ProcessorOutput {
        body: Some(BodySource::from_bytes(body.into_bytes())),
        should_close: false,
    })
}

pub fn build_error_body(status: HttpStatus) -> String {
    let template = templates::load(templates::ERROR_PAGE_TEMPLATE);
    let status_line = format!("{} {}", status.code(), status.reason_phrase());
    templates::render(
        &template,
        &[
            ("{{CODE}}", &templates::html_escape(&status.code().to_string())),
            ("{{STATUS_LINE}}", &templates::html_escape(&status_line)),
            ("{{MESSAGE}}", &templates::html_escape(status.reason_phrase())),
        ],
    )
}

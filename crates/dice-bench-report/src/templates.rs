//! Embedded LaTeX templates.

use std::sync::LazyLock;

use include_dir::{Dir, include_dir};
use minijinja::{AutoEscape, Environment, Error};

static TEMPLATE_DIR: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/templates");

static ENV: LazyLock<Environment<'static>> = LazyLock::new(|| {
    let mut env = Environment::new();
    // LaTeX output: backslashes and braces pass through untouched.
    env.set_auto_escape_callback(|_| AutoEscape::None);

    for file in TEMPLATE_DIR.files() {
        let (Some(name), Some(contents)) = (file.path().to_str(), file.contents_utf8()) else {
            continue;
        };
        if let Err(err) = env.add_template(name, contents) {
            tracing::error!(template = name, "failed to load template: {err}");
        }
    }
    env
});

pub fn render_template<T: serde::Serialize>(name: &str, ctx: T) -> Result<String, Error> {
    ENV.get_template(name)?.render(ctx)
}

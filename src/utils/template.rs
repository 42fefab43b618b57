//! String template rendering utilities.

pub struct TemplateVars;

impl TemplateVars {
    pub const SERVICE: &'static str = "service";
    pub const ALIAS: &'static str = "alias";
    pub const ROOT: &'static str = "root";
}

/// Replace every `{{key}}` with its value. Unknown placeholders are left alone.
pub fn render(template: &str, variables: &[(&str, &str)]) -> String {
    let mut result = template.to_string();

    for (key, value) in variables {
        let placeholder = format!("{{{{{}}}}}", key);
        result = result.replace(&placeholder, value);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_replaces_known_placeholders() {
        let rendered = render(
            "sudo service {{service}} restart # {{other}}",
            &[(TemplateVars::SERVICE, "varnish")],
        );
        assert_eq!(rendered, "sudo service varnish restart # {{other}}");
    }

    #[test]
    fn render_replaces_every_occurrence() {
        let rendered = render(
            "cd {{root}} && ls {{root}}",
            &[(TemplateVars::ROOT, "/srv/prod")],
        );
        assert_eq!(rendered, "cd /srv/prod && ls /srv/prod");
    }
}

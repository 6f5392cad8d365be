//! Rewrites legacy helper syntax to the current helper set.
//!
//! Migration is table driven and works on the text of each `{{ ... }}` tag,
//! leaving delimiters, surrounding text and untouched arguments in place.
//! Three kinds of rewrite exist:
//!
//! - rename: `{{firstName}}` becomes `{{faker 'person.firstName'}}`, and old
//!   faker namespaces such as `'name.firstName'` become `'person.firstName'`
//! - delete: helpers with no successor are removed
//! - positional: `{{faker 'random.number' 10}}` becomes
//!   `{{faker 'number.int' max=10}}`

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Template syntax version written by this engine.
pub const TEMPLATE_VERSION: u32 = 1;

enum MigrationRule {
    /// Replace the helper name (and optionally prepend arguments).
    Rename {
        from: &'static str,
        to: &'static str,
    },
    /// Remove the call entirely.
    Delete { helper: &'static str },
}

/// Faker methods whose first positional argument becomes a named argument.
struct PositionalRule {
    from: &'static str,
    to: &'static str,
    first_arg: &'static str,
}

const HELPER_RULES: &[MigrationRule] = &[
    MigrationRule::Rename { from: "firstName", to: "faker 'person.firstName'" },
    MigrationRule::Rename { from: "lastName", to: "faker 'person.lastName'" },
    MigrationRule::Rename { from: "title", to: "faker 'person.prefix'" },
    MigrationRule::Rename { from: "company", to: "faker 'company.name'" },
    MigrationRule::Rename { from: "domain", to: "faker 'internet.domainName'" },
    MigrationRule::Rename { from: "tld", to: "faker 'internet.domainSuffix'" },
    MigrationRule::Rename { from: "email", to: "faker 'internet.email'" },
    MigrationRule::Rename { from: "street", to: "faker 'location.street'" },
    MigrationRule::Rename { from: "city", to: "faker 'location.city'" },
    MigrationRule::Rename { from: "country", to: "faker 'location.country'" },
    MigrationRule::Rename { from: "countryCode", to: "faker 'location.countryCode'" },
    MigrationRule::Rename { from: "zipcode", to: "faker 'location.zipCode'" },
    MigrationRule::Rename { from: "postcode", to: "faker 'location.zipCode'" },
    MigrationRule::Rename { from: "lat", to: "faker 'location.latitude'" },
    MigrationRule::Rename { from: "long", to: "faker 'location.longitude'" },
    MigrationRule::Rename { from: "phone", to: "faker 'phone.number'" },
    MigrationRule::Rename { from: "color", to: "faker 'color.rgb'" },
    MigrationRule::Rename { from: "hexColor", to: "faker 'color.rgb'" },
    MigrationRule::Rename { from: "guid", to: "faker 'string.uuid'" },
    MigrationRule::Rename { from: "uuid", to: "faker 'string.uuid'" },
    MigrationRule::Rename { from: "boolean", to: "faker 'datatype.boolean'" },
    MigrationRule::Rename { from: "int", to: "faker 'number.int'" },
    MigrationRule::Rename { from: "float", to: "faker 'number.float'" },
    MigrationRule::Rename { from: "lorem", to: "faker 'lorem.words'" },
    MigrationRule::Rename { from: "bodyRaw", to: "body" },
    MigrationRule::Rename { from: "queryParamRaw", to: "queryParam" },
    MigrationRule::Rename { from: "dataRaw", to: "data" },
    MigrationRule::Delete { helper: "objectId" },
];

const FAKER_RENAMES: &[(&str, &str)] = &[
    ("name.firstName", "person.firstName"),
    ("name.lastName", "person.lastName"),
    ("name.findName", "person.fullName"),
    ("name.fullName", "person.fullName"),
    ("name.prefix", "person.prefix"),
    ("name.jobTitle", "person.jobTitle"),
    ("address.city", "location.city"),
    ("address.country", "location.country"),
    ("address.countryCode", "location.countryCode"),
    ("address.state", "location.state"),
    ("address.streetName", "location.street"),
    ("address.streetAddress", "location.streetAddress"),
    ("address.zipCode", "location.zipCode"),
    ("address.latitude", "location.latitude"),
    ("address.longitude", "location.longitude"),
    ("phone.phoneNumber", "phone.number"),
    ("random.uuid", "string.uuid"),
    ("datatype.uuid", "string.uuid"),
    ("random.boolean", "datatype.boolean"),
    ("random.word", "lorem.word"),
    ("internet.color", "color.rgb"),
];

const POSITIONAL_RULES: &[PositionalRule] = &[
    PositionalRule { from: "random.number", to: "number.int", first_arg: "max" },
    PositionalRule { from: "datatype.number", to: "number.int", first_arg: "max" },
    PositionalRule { from: "datatype.float", to: "number.float", first_arg: "max" },
    PositionalRule { from: "random.words", to: "lorem.words", first_arg: "max" },
];

static TAG_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{(\{?)([^{}]*)\}\}(\}?)").expect("valid tag regex")
});

/// Innermost call: a helper name at the start of a tag or after `(`, with
/// arguments that contain no further subexpressions.
static CALL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<open>^|\()(?P<ws>\s*)(?P<name>[A-Za-z][A-Za-z0-9_]*)(?P<args>(?:\s[^()]*?)?)(?P<tail>\s*)(?P<close>\)|$)")
        .expect("valid call regex")
});

static FAKER_ARG_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(?P<lead>\s+)(?P<q>['"])(?P<method>[A-Za-z0-9_.]+)['"](?P<rest>.*)$"#)
        .expect("valid faker argument regex")
});

/// Migrate every tag of a template to the current helper syntax.
pub fn migrate_template(template: &str) -> String {
    if !template.contains("{{") {
        return template.to_string();
    }

    TAG_REGEX
        .replace_all(template, |caps: &Captures| {
            let content = &caps[2];
            if content.trim_start().starts_with(['!', '/']) {
                return caps[0].to_string();
            }
            let migrated = migrate_tag_content(content);
            if migrated.trim().is_empty() {
                return String::new();
            }
            format!("{{{{{}{}}}}}{}", &caps[1], migrated, &caps[3])
        })
        .into_owned()
}

fn migrate_tag_content(content: &str) -> String {
    CALL_REGEX
        .replace_all(content, |caps: &Captures| {
            let open = &caps["open"];
            let close = &caps["close"];
            let name = &caps["name"];
            let args = &caps["args"];
            let rebuilt = |call: String| format!("{open}{}{call}{}{close}", &caps["ws"], &caps["tail"]);

            if name == "faker" {
                return rebuilt(format!("faker{}", migrate_faker_args(args)));
            }

            match HELPER_RULES.iter().find(|rule| match rule {
                MigrationRule::Rename { from, .. } => *from == name,
                MigrationRule::Delete { helper } => *helper == name,
            }) {
                Some(MigrationRule::Rename { to, .. }) => rebuilt(format!("{to}{args}")),
                // A deleted subexpression still needs a value in its slot
                Some(MigrationRule::Delete { .. }) if open == "(" => "''".to_string(),
                Some(MigrationRule::Delete { .. }) => String::new(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn migrate_faker_args(args: &str) -> String {
    let Some(caps) = FAKER_ARG_REGEX.captures(args) else {
        return args.to_string();
    };
    let lead = &caps["lead"];
    let quote = &caps["q"];
    let method = &caps["method"];
    let rest = &caps["rest"];

    if let Some(rule) = POSITIONAL_RULES.iter().find(|r| r.from == method) {
        let mut rest_args = rest.split_whitespace();
        return match rest_args.next() {
            Some(first) if !first.contains('=') => {
                let remaining: Vec<&str> = rest_args.collect();
                let mut out = format!("{lead}{quote}{}{quote} {}={first}", rule.to, rule.first_arg);
                for arg in remaining {
                    out.push(' ');
                    out.push_str(arg);
                }
                out
            }
            _ => format!("{lead}{quote}{}{quote}{rest}", rule.to),
        };
    }

    match FAKER_RENAMES.iter().find(|(from, _)| *from == method) {
        Some((_, to)) => format!("{lead}{quote}{to}{quote}{rest}"),
        None => args.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rename_bare_helper() {
        assert_eq!(
            migrate_template(r#"{"name": "{{firstName}}"}"#),
            r#"{"name": "{{faker 'person.firstName'}}"}"#
        );
    }

    #[test]
    fn test_rename_preserves_arguments_and_delimiters() {
        assert_eq!(migrate_template("{{{int 1 10}}}"), "{{{faker 'number.int' 1 10}}}");
        assert_eq!(
            migrate_template("{{bodyRaw 'user.id' 'none'}}"),
            "{{body 'user.id' 'none'}}"
        );
    }

    #[test]
    fn test_rename_in_subexpression() {
        assert_eq!(
            migrate_template("{{oneOf (array (guid) 'x')}}"),
            "{{oneOf (array (faker 'string.uuid') 'x')}}"
        );
    }

    #[test]
    fn test_faker_namespace_rename() {
        assert_eq!(
            migrate_template("{{faker 'name.firstName'}} {{faker \"address.city\"}}"),
            "{{faker 'person.firstName'}} {{faker \"location.city\"}}"
        );
    }

    #[test]
    fn test_positional_rewrite() {
        assert_eq!(
            migrate_template("{{faker 'random.number' 10}}"),
            "{{faker 'number.int' max=10}}"
        );
        assert_eq!(
            migrate_template("{{faker 'datatype.number'}}"),
            "{{faker 'number.int'}}"
        );
    }

    #[test]
    fn test_delete_helper_without_successor() {
        assert_eq!(migrate_template("id: {{objectId}}!"), "id: !");
        assert_eq!(
            migrate_template("{{concat (objectId) 'x'}}"),
            "{{concat '' 'x'}}"
        );
    }

    #[test]
    fn test_untouched_templates() {
        let template = "{{#switch (urlParam 'id')}}{{#case '1'}}a{{/case}}{{/switch}} {{! firstName }}";
        assert_eq!(migrate_template(template), template);
        assert_eq!(
            migrate_template("{{#repeat (int 1 3)}}x{{/repeat}}"),
            "{{#repeat (faker 'number.int' 1 3)}}x{{/repeat}}"
        );
        assert_eq!(migrate_template("no tags"), "no tags");
        assert_eq!(
            migrate_template("{{queryParam 'email'}}"),
            "{{queryParam 'email'}}"
        );
    }
}

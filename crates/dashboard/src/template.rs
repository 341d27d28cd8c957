//! Fixed-format HTML for the three dashboard views.

use crate::{view::ViewModel, DashboardArgs};

const PAGE_HEAD: &str = r#"<html>
	<head>
		<link href="https://cdn.jsdelivr.net/npm/bootstrap@5.1.1/dist/css/bootstrap.min.css" rel="stylesheet" integrity="sha384-F3w7mX95PdgyTmZZMECAngseQB83DfGTowi0iMjiWaeVhAn4FJkqJByhZMI3AhiU" crossorigin="anonymous">
		<title>SpiceDB Dashboard</title>
		<style type="text/css">
		body {
			margin: 20px;
		}

		pre {
			border: 1px solid #ddd;
			background-color: #eee;
			padding: 10px;
		}
		</style>
	</head>
	<body>
"#;

const PAGE_TAIL: &str = "\t</body>\n</html>\n";

const SAMPLE_SCHEMA: &str = r#"definition user {}

definition resource {
	relation reader: user
	relation writer: user

	permission write = writer
	permission view = reader + write
}"#;

pub fn render_page(args: &DashboardArgs, view: &ViewModel) -> String {
    let mut html = String::with_capacity(4096);
    html.push_str(PAGE_HEAD);

    if !view.is_ready {
        push_migrate_guidance(&mut html, args);
    } else if view.is_empty {
        push_define_schema_guidance(&mut html, args);
    } else {
        push_current_schema(&mut html, args, view);
    }

    html.push_str(PAGE_TAIL);
    html
}

fn push_migrate_guidance(html: &mut String, args: &DashboardArgs) {
    html.push_str("\t<h1>Getting Started with SpiceDB</h1>\n");
    html.push_str("\t<p>\n\t\tTo get started with SpiceDB, please run the migrate command below to setup your backing data store:\n\t</p>\n");
    html.push_str(&format!(
        "<pre>\nspicedb migrate head --datastore-engine={} --datastore-conn-uri=\"your-connection-uri-here\"\n</pre>\n",
        escape_html(&args.datastore_engine)
    ));
}

fn push_define_schema_guidance(html: &mut String, args: &DashboardArgs) {
    let insecure = insecure_flag(args);
    html.push_str("\t\t<h1>Defining the permissions schema</h1>\n");
    html.push_str(concat!(
        "\t\t<p>\n",
        "\t\t\tTo begin making API requests to SpiceDB, you'll first need to load in a ",
        "<a href=\"https://docs.authzed.com/reference/schema-lang\" target=\"_blank\" rel=\"noopener\">Schema</a>\n",
        "\t\t\tthat defines the permissions system.\n",
        "\t\t</p>\n",
        "\t\t<p>\n",
        "\t\t\tRun the following command to load in a sample permissions system:\n",
    ));
    html.push_str("<pre>\n# Install the zed CLI tool\nbrew install authzed/tap/zed\n\n");
    html.push_str(&format!(
        "# Login to SpiceDB\nzed context set first-dev-context {} \"the preshared key here\" {insecure}\n\n",
        escape_html(&args.grpc_addr)
    ));
    html.push_str("# Save the sample schema\ncat &gt; sample.zed &lt;&lt; 'SCHEMA'\n");
    html.push_str(SAMPLE_SCHEMA);
    html.push_str("\nSCHEMA\n\n");
    html.push_str(&format!(
        "# Write a sample schema\nzed schema write sample.zed {insecure}\n</pre>\n\t\t</p>\n"
    ));
}

fn push_current_schema(html: &mut String, args: &DashboardArgs, view: &ViewModel) {
    html.push_str("\t\t<h1>SpiceDB</h1>\n\t\t<h2>Current Schema</h2>\n");
    html.push_str(&format!(
        "\t\t<pre>{}</pre>\n",
        escape_html(&view.schema_text)
    ));

    if !view.has_sample_schema {
        return;
    }

    let insecure = insecure_flag(args);
    html.push_str("\t\t<h2>Sample Calls</h2>\n");
    html.push_str("\t\t<h3>How to write a relationship</h3>\n");
    html.push_str(&format!(
        "<pre>\n# Write a sample relationship\nzed relationship create user:sampleuser reader resource:sampleresource {insecure}\n</pre>\n"
    ));
    html.push_str("\t\t<h3>How to check a permission</h3>\n");
    html.push_str(&format!(
        "<pre>\n# Check a permission\nzed permission check user:sampleuser view resource:sampleresource {insecure}\n</pre>\n"
    ));
}

fn insecure_flag(args: &DashboardArgs) -> &'static str {
    if args.grpc_no_tls {
        "--insecure "
    } else {
        ""
    }
}

pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&#34;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
#[path = "tests/template_tests.rs"]
mod tests;

//! Rendering of descriptors into Terraform configuration text.
//!
//! The renderer is a pure function over a fixed set of named fragments. The
//! header, provider and locals blocks are always emitted; each requested
//! service contributes exactly one fragment, and fragments are composed in
//! [`ServiceKind::ALL`] order so the same descriptor always yields the same
//! bytes.

use std::fmt::Write;

use crate::error::Result;

use super::descriptor::{Descriptor, ServiceKind};
use super::hash::ConfigHasher;
use super::validator::DescriptorValidator;

/// File name the rendered configuration is written to.
pub const CONFIG_FILE_NAME: &str = "main.tf";

/// A rendered configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedConfig {
    /// The configuration text.
    pub text: String,
    /// SHA-256 fingerprint of `text`.
    pub fingerprint: String,
    /// Provider region baked into `text`.
    pub region: String,
    /// Services that contributed a fragment, in rendering order.
    pub services: Vec<ServiceKind>,
}

/// Renderer for descriptors.
#[derive(Debug, Clone, Default)]
pub struct ConfigRenderer {
    validator: DescriptorValidator,
}

impl ConfigRenderer {
    /// Creates a renderer with the default region allow-list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a renderer using a custom validator.
    #[must_use]
    pub const fn with_validator(validator: DescriptorValidator) -> Self {
        Self { validator }
    }

    /// Returns the validator used before rendering.
    #[must_use]
    pub const fn validator(&self) -> &DescriptorValidator {
        &self.validator
    }

    /// Renders a descriptor.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` if the name is empty or invalid, or the
    /// region is missing or unrecognized.
    pub fn render(&self, descriptor: &Descriptor) -> Result<RenderedConfig> {
        self.validator.validate(descriptor)?;

        // Validation guarantees a region is present.
        let region = descriptor.region().unwrap_or_default();
        let services = descriptor.services.enabled();

        let mut text = String::new();
        render_header(&mut text, region);
        render_locals(&mut text, descriptor);
        for kind in &services {
            text.push('\n');
            text.push_str(service_fragment(*kind));
        }
        render_outputs(&mut text, &services);

        let fingerprint = ConfigHasher::new().fingerprint(&text);
        Ok(RenderedConfig {
            text,
            fingerprint,
            region: region.to_string(),
            services,
        })
    }
}

/// Reads the provider region back out of rendered configuration text.
///
/// Returns `None` for text this renderer did not produce.
#[must_use]
pub fn rendered_region(text: &str) -> Option<&str> {
    let mut in_provider = false;
    for line in text.lines() {
        if line.starts_with("provider \"aws\"") {
            in_provider = true;
        } else if in_provider {
            if let Some(value) = line.trim().strip_prefix("region = ") {
                return value.strip_prefix('"')?.strip_suffix('"');
            }
            if line.starts_with('}') {
                return None;
            }
        }
    }
    None
}

fn render_header(out: &mut String, region: &str) {
    out.push_str(
        r#"terraform {
  required_version = ">= 1.5.0"

  required_providers {
    aws = {
      source  = "hashicorp/aws"
      version = "~> 5.0"
    }
  }
}
"#,
    );
    let _ = write!(
        out,
        "\nprovider \"aws\" {{\n  region = {}\n\n  default_tags {{\n    tags = local.common_tags\n  }}\n}}\n",
        hcl_string(region)
    );
}

fn render_locals(out: &mut String, descriptor: &Descriptor) {
    let _ = write!(
        out,
        "\nlocals {{\n  app_name = {}\n  stage    = {}\n  target   = {}\n\n  common_tags = {{\n    Application = {}\n    Stage       = {}\n    ManagedBy   = \"halldyll-infra\"\n  }}\n}}\n",
        hcl_string(&descriptor.name),
        hcl_string(&descriptor.environment.stage),
        hcl_string(&descriptor.environment.target.to_string()),
        hcl_string(&descriptor.name),
        hcl_string(&descriptor.environment.stage),
    );
}

fn render_outputs(out: &mut String, services: &[ServiceKind]) {
    out.push_str("\noutput \"app_name\" {\n  value = local.app_name\n}\n");
    for kind in services {
        let (name, value) = match kind {
            ServiceKind::Database => ("database_endpoint", "aws_db_instance.main.endpoint"),
            ServiceKind::Cache => (
                "cache_endpoint",
                "aws_elasticache_cluster.main.cache_nodes[0].address",
            ),
            ServiceKind::Queue => ("queue_url", "aws_sqs_queue.main.url"),
            ServiceKind::Storage => ("bucket_name", "aws_s3_bucket.main.bucket"),
            ServiceKind::Ai => ("ai_domain_id", "aws_sagemaker_domain.main.id"),
        };
        let _ = write!(out, "\noutput \"{name}\" {{\n  value = {value}\n}}\n");
    }
}

/// Returns the fixed fragment for a service.
///
/// Fragments reference `local.app_name` rather than interpolating the name,
/// so the descriptor name appears in exactly one place.
#[must_use]
pub const fn service_fragment(kind: ServiceKind) -> &'static str {
    match kind {
        ServiceKind::Database => {
            r#"# service: database
resource "aws_db_instance" "main" {
  identifier          = "${local.app_name}-db"
  engine              = "postgres"
  engine_version      = "16"
  instance_class      = "db.t4g.micro"
  allocated_storage   = 20
  db_name             = "app"
  username            = "app"
  manage_master_user_password = true
  skip_final_snapshot = true
}
"#
        }
        ServiceKind::Cache => {
            r#"# service: cache
resource "aws_elasticache_cluster" "main" {
  cluster_id      = "${local.app_name}-cache"
  engine          = "redis"
  node_type       = "cache.t4g.micro"
  num_cache_nodes = 1
}
"#
        }
        ServiceKind::Queue => {
            r#"# service: queue
resource "aws_sqs_queue" "main" {
  name                      = "${local.app_name}-queue"
  message_retention_seconds = 345600
}
"#
        }
        ServiceKind::Storage => {
            r#"# service: storage
resource "aws_s3_bucket" "main" {
  bucket_prefix = "${local.app_name}-"
  force_destroy = true
}
"#
        }
        ServiceKind::Ai => {
            r#"# service: ai
resource "aws_sagemaker_domain" "main" {
  domain_name = "${local.app_name}-ml"
  auth_mode   = "IAM"
  vpc_id      = data.aws_vpc.default.id
  subnet_ids  = data.aws_subnets.default.ids

  default_user_settings {
    execution_role = aws_iam_role.sagemaker.arn
  }
}

data "aws_vpc" "default" {
  default = true
}

data "aws_subnets" "default" {
  filter {
    name   = "vpc-id"
    values = [data.aws_vpc.default.id]
  }
}

resource "aws_iam_role" "sagemaker" {
  name_prefix = "${local.app_name}-ml-"
  assume_role_policy = jsonencode({
    Version = "2012-10-17"
    Statement = [{
      Effect    = "Allow"
      Action    = "sts:AssumeRole"
      Principal = { Service = "sagemaker.amazonaws.com" }
    }]
  })
}
"#
        }
    }
}

/// Quotes a value as an HCL string literal.
///
/// Escapes quotes, backslashes and control characters, and doubles the
/// template introducers `${` and `%{` so values are never interpolated.
#[must_use]
pub fn hcl_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '$' | '%' if chars.peek() == Some(&'{') => {
                out.push(c);
                out.push(c);
            }
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04X}", u32::from(c));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn orders() -> Descriptor {
        Descriptor::new("orders", "eu-west-1").with_service(ServiceKind::Database)
    }

    #[test]
    fn test_rendered_region_reads_provider_block() {
        let rendered = ConfigRenderer::new().render(&orders()).unwrap();
        assert_eq!(rendered.region, "eu-west-1");
        assert_eq!(rendered_region(&rendered.text), Some("eu-west-1"));
        assert_eq!(rendered_region("resource \"null_resource\" \"x\" {}\n"), None);
    }

    #[test]
    fn test_render_is_idempotent() {
        let renderer = ConfigRenderer::new();
        let descriptor = orders()
            .with_service(ServiceKind::Queue)
            .with_service(ServiceKind::Storage);

        let first = renderer.render(&descriptor).unwrap();
        let second = renderer.render(&descriptor).unwrap();
        assert_eq!(first.text.as_bytes(), second.text.as_bytes());
        assert_eq!(first.fingerprint, second.fingerprint);
    }

    #[test]
    fn test_render_orders_database_only() {
        let rendered = ConfigRenderer::new().render(&orders()).unwrap();

        assert!(rendered.text.contains("region = \"eu-west-1\""));
        assert!(rendered.text.contains("app_name = \"orders\""));
        assert!(rendered.text.contains("# service: database"));
        assert!(rendered.text.contains("aws_db_instance"));
        assert!(!rendered.text.contains("# service: cache"));
        assert!(!rendered.text.contains("# service: queue"));
        assert!(!rendered.text.contains("aws_elasticache_cluster"));
        assert!(!rendered.text.contains("aws_sqs_queue"));
        assert_eq!(rendered.services, vec![ServiceKind::Database]);
    }

    #[test]
    fn test_fragments_follow_fixed_order() {
        let descriptor = Descriptor::new("orders", "us-east-1")
            .with_service(ServiceKind::Ai)
            .with_service(ServiceKind::Cache)
            .with_service(ServiceKind::Database);
        let text = ConfigRenderer::new().render(&descriptor).unwrap().text;

        let db = text.find("# service: database").unwrap();
        let cache = text.find("# service: cache").unwrap();
        let ai = text.find("# service: ai").unwrap();
        assert!(db < cache && cache < ai);
    }

    #[test]
    fn test_render_rejects_invalid_descriptor() {
        let renderer = ConfigRenderer::new();

        let err = renderer.render(&Descriptor::new("", "eu-west-1")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let mut no_region = orders();
        no_region.environment.region = None;
        assert_eq!(renderer.render(&no_region).unwrap_err().kind(), ErrorKind::Validation);

        let err = renderer.render(&Descriptor::new("orders", "nowhere-1")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_hcl_string_escaping() {
        assert_eq!(hcl_string("plain"), "\"plain\"");
        assert_eq!(hcl_string("a\"b"), "\"a\\\"b\"");
        assert_eq!(hcl_string("a\\b"), "\"a\\\\b\"");
        assert_eq!(hcl_string("${var.x}"), "\"$${var.x}\"");
        assert_eq!(hcl_string("%{if}"), "\"%%{if}\"");
        assert_eq!(hcl_string("100%"), "\"100%\"");
        assert_eq!(hcl_string("line\nbreak"), "\"line\\nbreak\"");
    }
}

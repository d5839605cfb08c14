//! ---
//! ret_section: "14-licensing-system"
//! ret_subsection: "binary"
//! ret_type: "source"
//! ret_scope: "code"
//! ret_description: "Vendor CLI for license keys, issuance, and inspection."
//! ret_version: "v0.1.0"
//! ret_owner: "tbd"
//! ---
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::Args;
use ret_common::config::AppConfig;
use ret_common::license::issuer_from_config;
use ret_common::logging::{log_system_event, LogContext, SystemEventOutcome};
use ret_licensing::issuer::validate_request;
use ret_licensing::{IssuedLicense, LicenseError, LicenseRequest, LicenseTier};

#[derive(Debug, Args)]
pub struct IssueCommand {
    /// Directory for the license file (defaults to issuer.output_dir).
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,
}

impl IssueCommand {
    pub fn execute(self, config: &AppConfig) -> Result<()> {
        let mut issuer_config = config.issuer.clone();
        if let Some(dir) = self.output_dir {
            issuer_config.output_dir = dir;
        }
        let issuer = issuer_from_config(&issuer_config)?;

        let stdin = io::stdin();
        let mut prompter = Prompter::new(stdin.lock(), io::stdout());
        let Some(request) = collect_request(&mut prompter)? else {
            println!("Issuance cancelled.");
            return Ok(());
        };

        match issuer.issue(&request) {
            Ok(issued) => {
                report_issued(&issued);
                Ok(())
            }
            Err(err) => {
                log_issue_fault(&request, &err);
                Err(anyhow!(err).context("license issuance failed"))
            }
        }
    }
}

#[derive(Debug, Args)]
pub struct BatchCommand {
    /// JSON file holding an array of license requests.
    #[arg(long, value_name = "FILE")]
    requests: PathBuf,
    /// Directory for the license files (defaults to issuer.output_dir).
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,
}

impl BatchCommand {
    pub fn execute(self, config: &AppConfig) -> Result<()> {
        let raw = fs::read_to_string(&self.requests)
            .with_context(|| format!("unable to read {}", self.requests.display()))?;
        let requests: Vec<LicenseRequest> = serde_json::from_str(&raw)
            .with_context(|| format!("{} is not a JSON array of requests", self.requests.display()))?;
        if requests.is_empty() {
            bail!("{} contains no requests", self.requests.display());
        }

        let mut issuer_config = config.issuer.clone();
        if let Some(dir) = self.output_dir {
            issuer_config.output_dir = dir;
        }
        let issuer = issuer_from_config(&issuer_config)?;

        let outcomes = issuer.issue_batch(&requests);
        let mut failed = 0usize;
        for outcome in &outcomes {
            match &outcome.result {
                Ok(issued) => println!(
                    "[{:>3}] OK    {} -> {}",
                    outcome.index + 1,
                    outcome.company,
                    issued.path.display()
                ),
                Err(err) => {
                    failed += 1;
                    log_issue_fault(&requests[outcome.index], err);
                    println!("[{:>3}] FAIL  {}: {err}", outcome.index + 1, outcome.company);
                }
            }
        }
        println!(
            "Issued {} of {} license(s).",
            outcomes.len() - failed,
            outcomes.len()
        );
        if failed > 0 {
            bail!("{failed} license request(s) failed");
        }
        Ok(())
    }
}

fn report_issued(issued: &IssuedLicense) {
    let license = &issued.license;
    let tier = license.tier().to_string();
    let ctx = LogContext::new()
        .with_license_id(&license.id)
        .with_tier(&tier)
        .with_client(&license.client.company);
    log_system_event(
        Some(&ctx),
        "license.issue",
        "license file written",
        SystemEventOutcome::Success,
    );

    println!();
    println!("License issued");
    println!("  File            : {}", issued.path.display());
    println!("  License key     : {}", license.license_key());
    println!("  Activation code : {}", license.activation_code());
    println!(
        "  Client          : {} ({}, {})",
        license.client.company, license.client.name, license.client.rif
    );
    println!("  Tier            : {tier}");
    println!("  Expires         : {}", license.expires_at().format("%Y-%m-%d"));
}

fn log_issue_fault(request: &LicenseRequest, err: &LicenseError) {
    let tier = request.tier.to_string();
    let ctx = LogContext::new()
        .with_tier(&tier)
        .with_client(&request.company_name);
    log_system_event(
        Some(&ctx),
        "license.issue",
        &err.to_string(),
        SystemEventOutcome::Fault,
    );
}

/// Walk the operator through a license request. `None` when they decline
/// to issue at the confirmation step.
fn collect_request<R: BufRead, W: Write>(
    prompter: &mut Prompter<R, W>,
) -> Result<Option<LicenseRequest>> {
    loop {
        prompter.say("\n=== Client ===")?;
        let client_name = prompter.text("Client name", None, false)?;
        let company_name = prompter.text("Company name", None, false)?;
        let tax_id = prompter.text("RIF (e.g. J-12345678-9)", None, false)?;
        let email = prompter.text("Email", None, false)?;
        let phone = prompter.text("Phone (optional)", None, true)?;

        prompter.say("\n=== License ===")?;
        let labels: Vec<String> = LicenseTier::ALL.iter().map(tier_label).collect();
        let choice = prompter.choice("License tier", &labels, 1)?;
        let tier = LicenseTier::from_menu_choice(choice + 1)
            .ok_or_else(|| anyhow!("tier menu out of range"))?;
        let duration_months = prompter.number("Duration in months", 12u32)?;
        let notes = prompter.text("Notes (optional)", None, true)?;

        let mut request = LicenseRequest::new(
            client_name,
            company_name,
            tax_id.to_uppercase(),
            email,
            tier,
            duration_months,
        );
        request.phone = Some(phone).filter(|phone| !phone.is_empty());
        request.notes = Some(notes).filter(|notes| !notes.is_empty());

        match validate_request(&request) {
            Ok(()) => {}
            Err(LicenseError::Validation(errors)) => {
                prompter.say("\nThe request is not valid:")?;
                for violation in errors.violations() {
                    prompter.say(&format!("  - {violation}"))?;
                }
                if prompter.yes_no("Start over?", true)? {
                    continue;
                }
                return Ok(None);
            }
            Err(other) => return Err(other.into()),
        }

        prompter.say(&format!(
            "\n{} / {} / {} / {} month(s)",
            request.company_name, request.tax_id, request.tier, request.duration_months
        ))?;
        if prompter.yes_no("Issue this license?", true)? {
            return Ok(Some(request));
        }
        return Ok(None);
    }
}

fn tier_label(tier: &LicenseTier) -> String {
    let policy = tier.policy();
    let quota = |limit: i64| {
        if limit == ret_licensing::UNLIMITED {
            "unlimited".to_owned()
        } else {
            limit.to_string()
        }
    };
    format!(
        "{tier}: {} records, {} users, {} companies",
        quota(policy.max_records),
        quota(policy.max_users),
        quota(policy.max_companies)
    )
}

/// Line-oriented prompts over any reader/writer pair.
struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn say(&mut self, line: &str) -> Result<()> {
        writeln!(self.output, "{line}").context("failed to write prompt")
    }

    fn read_line(&mut self) -> Result<String> {
        self.output
            .flush()
            .context("failed to flush prompt to stdout")?;
        let mut input = String::new();
        let read = self
            .input
            .read_line(&mut input)
            .context("failed to read response from stdin")?;
        if read == 0 {
            return Err(anyhow!("input stream closed"));
        }
        Ok(input.trim().to_owned())
    }

    fn text(&mut self, prompt: &str, default: Option<&str>, allow_empty: bool) -> Result<String> {
        loop {
            let written = match default {
                Some(default) => write!(self.output, "{prompt} [{default}]: "),
                None => write!(self.output, "{prompt}: "),
            };
            written.context("failed to write prompt")?;

            let answer = self.read_line()?;
            if answer.is_empty() {
                if let Some(default) = default {
                    return Ok(default.to_owned());
                }
                if allow_empty {
                    return Ok(String::new());
                }
                self.say("Input cannot be empty. Please try again.")?;
                continue;
            }
            return Ok(answer);
        }
    }

    fn yes_no(&mut self, prompt: &str, default: bool) -> Result<bool> {
        loop {
            let suffix = if default { "[Y/n]" } else { "[y/N]" };
            write!(self.output, "{prompt} {suffix}: ").context("failed to write prompt")?;
            let answer = self.read_line()?;
            if answer.is_empty() {
                return Ok(default);
            }
            match answer.to_lowercase().as_str() {
                "y" | "yes" | "s" | "si" | "sí" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => self.say("Please enter 'y' or 'n'.")?,
            }
        }
    }

    fn choice(&mut self, prompt: &str, options: &[String], default_index: usize) -> Result<usize> {
        if options.is_empty() {
            return Err(anyhow!("choice prompt requires at least one option"));
        }
        let default_index = default_index.min(options.len() - 1);
        loop {
            self.say(prompt)?;
            for (idx, option) in options.iter().enumerate() {
                self.say(&format!("  {}. {}", idx + 1, option))?;
            }
            let default_prompt = (default_index + 1).to_string();
            let input = self.text("Select option", Some(&default_prompt), false)?;
            match input.parse::<usize>() {
                Ok(value) if (1..=options.len()).contains(&value) => return Ok(value - 1),
                _ => self.say(&format!("Enter a number between 1 and {}.", options.len()))?,
            }
        }
    }

    fn number(&mut self, prompt: &str, default: u32) -> Result<u32> {
        loop {
            let default_text = default.to_string();
            let input = self.text(prompt, Some(&default_text), false)?;
            match input.parse::<u32>() {
                Ok(value) => return Ok(value),
                Err(_) => self.say("Enter a whole number.")?,
            }
        }
    }
}

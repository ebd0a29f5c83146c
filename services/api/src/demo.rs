use crate::infra::{InMemoryAttachmentStore, InMemoryRecordStore};
use clap::Args;
use recruit_board::error::AppError;
use recruit_board::workflows::registration::{
    Attachment, Field, RegistrationWizard, SchemaPreset, SubmissionPipeline, SubmitOutcome,
    WizardError,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const SAMPLE_PHOTO: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
const SAMPLE_RESUME: &[u8] = b"%PDF-1.4\n% sample resume\n";

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Form layout to walk through (`documents` or `classic`)
    #[arg(long, default_value = "documents")]
    pub(crate) schema: String,
    /// Profile photo to attach instead of the built-in sample
    #[arg(long)]
    pub(crate) photo: Option<PathBuf>,
    /// Resume to attach instead of the built-in sample
    #[arg(long)]
    pub(crate) resume: Option<PathBuf>,
    /// Make every upload fail to show how a failed submission is reported
    #[arg(long)]
    pub(crate) fail_upload: bool,
}

type DemoWizard = RegistrationWizard<InMemoryAttachmentStore, InMemoryRecordStore>;

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        schema,
        photo,
        resume,
        fail_upload,
    } = args;

    let Some(preset) = SchemaPreset::from_name(&schema) else {
        println!("Unknown form layout `{schema}`; expected `documents` or `classic`");
        return Ok(());
    };

    let attachments = if fail_upload {
        InMemoryAttachmentStore::failing("storage bucket unreachable")
    } else {
        InMemoryAttachmentStore::default()
    };
    let records = InMemoryRecordStore::default();
    let mut wizard = RegistrationWizard::new(
        Arc::new(preset.schema()),
        SubmissionPipeline::new(Arc::new(attachments.clone()), Arc::new(records.clone())),
    );

    println!("WLUG registration demo ({} steps)", wizard.total_steps());

    println!("\nStep 1 submitted empty:");
    wizard.advance();
    print_errors(&wizard);

    let photo = load_attachment(photo.as_deref(), "avatar.png", SAMPLE_PHOTO)?;
    let resume = load_attachment(resume.as_deref(), "resume.pdf", SAMPLE_RESUME)?;
    let answers = [
        (Field::FullName, "Ira Deshmukh"),
        (Field::Email, "ira.deshmukh@wlug.org"),
        (Field::Mobile, "98230 45678"),
        (Field::Branch, "cse"),
        (Field::Year, "2"),
        (Field::Prn, "72145678B"),
        (Field::Mission, "Run beginner workshops on shell scripting"),
    ];

    while wizard.current_step() < wizard.total_steps() {
        let step = wizard.current_step();
        let Some(definition) = wizard.schema().step(step).cloned() else {
            break;
        };
        for field in definition.fields {
            let result = match field {
                Field::ProfilePhoto => wizard.update_field(field, photo.clone()),
                Field::Resume => wizard.update_field(field, resume.clone()),
                _ => {
                    let value = answers
                        .iter()
                        .find(|(candidate, _)| *candidate == field)
                        .map(|(_, value)| *value)
                        .unwrap_or_default();
                    wizard.update_field(field, value)
                }
            };
            if let Err(err) = result {
                println!("  Could not fill {}: {}", field.label(), err);
            }
        }

        if !wizard.advance() {
            println!("Step {step} ({}) did not validate:", definition.title);
            print_errors(&wizard);
            return Ok(());
        }
        println!("- Step {step} ({}) complete", definition.title);
    }

    println!("\nSubmitting from the review step...");
    match wizard.submit().await {
        Ok(SubmitOutcome::Succeeded(receipt)) => {
            println!("Registration stored. Member badge:");
            match serde_json::to_string_pretty(&receipt) {
                Ok(json) => println!("{json}"),
                Err(err) => println!("  Receipt unavailable: {err}"),
            }
            println!("Stored files: {}", attachments.paths().join(", "));
            println!("Rows in record store: {}", records.rows().len());
        }
        Ok(SubmitOutcome::Failed(failure)) => {
            println!("Submission failed during {:?}: {}", failure.stage, failure.reason());
            println!(
                "Draft kept for retry ({} still entered)",
                wizard.draft().full_name
            );
        }
        Ok(SubmitOutcome::Rejected) => {
            println!("Review step rejected the draft:");
            print_errors(&wizard);
        }
        Ok(SubmitOutcome::Ignored) => println!("A submission is already running"),
        Err(WizardError::Locked) => println!("This registration was already submitted"),
        Err(err) => println!("Submit unavailable: {err}"),
    }

    Ok(())
}

fn print_errors(wizard: &DemoWizard) {
    for (field, message) in wizard.errors().iter() {
        println!("  - {}: {}", field.label(), message);
    }
}

/// Read `path` when given, otherwise fall back to the bundled sample.
fn load_attachment(
    path: Option<&Path>,
    sample_name: &str,
    sample: &[u8],
) -> Result<Attachment, AppError> {
    let Some(path) = path else {
        let content_type = mime_guess::from_path(sample_name).first_or_octet_stream();
        return Ok(Attachment::new(
            sample_name,
            content_type.essence_str(),
            sample.to_vec(),
        ));
    };

    let bytes = std::fs::read(path)?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| sample_name.to_string());
    let content_type = mime_guess::from_path(path).first_or_octet_stream();
    Ok(Attachment::new(
        file_name,
        content_type.essence_str(),
        bytes,
    ))
}

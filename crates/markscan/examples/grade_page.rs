use markscan::detect::grade_image;
use markscan::{AnswerTemplate, PageGrader, QuestionOutcome};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(feature = "tracing")]
    markscan::core::init_tracing(log::LevelFilter::Info, false);
    #[cfg(not(feature = "tracing"))]
    markscan::core::init_with_level(log::LevelFilter::Info)?;

    let mut args = std::env::args().skip(1);
    let (Some(template_path), Some(page_path)) = (args.next(), args.next()) else {
        eprintln!("Usage: grade_page <template.json> <page.png>");
        return Ok(());
    };

    let template = AnswerTemplate::load_json(&template_path)?;
    let grader = PageGrader::new(&template)?;
    let img = image::open(&page_path)?;
    let report = grade_image(&grader, page_path, &img)?;

    let alignment = if report.alignment.is_rectified() {
        "rectified"
    } else {
        "unaligned"
    };
    println!("alignment: {alignment}");
    if let Some(id) = report.student_id() {
        println!("student id: {id}");
    }
    for q in &report.questions {
        match &q.outcome {
            QuestionOutcome::Marksheet {
                detection, correct, ..
            } => println!("{}: {detection:?} correct={correct:?}", q.id),
            QuestionOutcome::IdGrid { value, .. } => println!("{}: id {value:?}", q.id),
        }
    }
    Ok(())
}

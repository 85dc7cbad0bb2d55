use chrono::{DateTime, Local};
use std::fmt;
use std::time::Duration;

use crate::assignment::AssignmentRouter;
use crate::model::{ProcessedBatch, ValidationWarning};
use crate::split::SplitError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlaggedRecord {
    pub submitter: String,
    /// 1-based position within the submitter's records.
    pub position: usize,
    pub target_name: String,
    pub warnings: Vec<ValidationWarning>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// When the batch was built.
    pub run_at: DateTime<Local>,
    /// Wall time of the whole run; the pipeline fills it in just before
    /// logging.
    pub elapsed: Duration,
    pub total_records: usize,
    pub total_submitters: usize,
    pub per_manager: Vec<(String, usize)>,
    pub unmapped: Vec<String>,
    pub flagged: Vec<FlaggedRecord>,
}

/// Aggregate a batch against the assignment table. Managers are credited with
/// the records actually routed to them, so split submitters are not counted
/// twice.
pub fn summarize(batch: &ProcessedBatch, router: &AssignmentRouter) -> Result<Report, SplitError> {
    let mut per_manager = Vec::with_capacity(router.assignments().len());
    for a in router.assignments() {
        let mut total = 0;
        for submitter in &a.submitters {
            total += router
                .route(&a.manager, submitter, batch.records_for(submitter))?
                .items
                .len();
        }
        per_manager.push((a.manager.clone(), total));
    }

    let known = router.all_submitters();
    let unmapped = batch
        .submitters()
        .filter(|s| !known.contains(s))
        .map(str::to_string)
        .collect();

    let flagged = batch
        .groups
        .iter()
        .flat_map(|g| {
            g.records
                .iter()
                .enumerate()
                .filter(|(_, r)| r.is_flagged())
                .map(|(i, r)| FlaggedRecord {
                    submitter: g.submitter.clone(),
                    position: i + 1,
                    target_name: r.target_name.clone(),
                    warnings: r.warnings.clone(),
                })
        })
        .collect();

    Ok(Report {
        run_at: batch.last_updated,
        elapsed: Duration::ZERO,
        total_records: batch.total_records(),
        total_submitters: batch.groups.len(),
        per_manager,
        unmapped,
        flagged,
    })
}

fn display_name(name: &str) -> &str {
    if name.is_empty() {
        "(이름 없음)"
    } else {
        name
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "📊 기도제목 파이프라인 실행 보고서")?;
        writeln!(f, "{}", "=".repeat(50))?;
        writeln!(f, "🕐 실행 시간: {}", self.run_at.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(f, "⏱️  처리 소요시간: {:.2}초", self.elapsed.as_secs_f64())?;
        writeln!(f, "📝 총 기도제목 수: {}개", self.total_records)?;
        writeln!(f, "👥 제출자 수: {}명", self.total_submitters)?;
        writeln!(f, "📋 담당자별 분배:")?;
        for (manager, count) in &self.per_manager {
            writeln!(f, "   📌 {}: {}개", manager, count)?;
        }
        if !self.unmapped.is_empty() {
            let names: Vec<&str> = self.unmapped.iter().map(|s| display_name(s)).collect();
            writeln!(f, "⚠️  담당자 미지정: {}", names.join(", "))?;
        }
        if !self.flagged.is_empty() {
            writeln!(f, "⚠️  확인 필요 {}건:", self.flagged.len())?;
            for rec in &self.flagged {
                let warnings: Vec<String> = rec.warnings.iter().map(|w| w.to_string()).collect();
                writeln!(
                    f,
                    "   - {} #{} ({}): {}",
                    display_name(&rec.submitter),
                    rec.position,
                    display_name(&rec.target_name),
                    warnings.join("; ")
                )?;
            }
        }
        write!(f, "✅ 파이프라인 실행 완료")
    }
}

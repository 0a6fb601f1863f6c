//! End-to-end curriculum extraction over a realistic full-page document:
//! navigation chrome, a multi-year program with semester and intersession
//! labels, entity-encoded text, and embedded term codes in course numbers.

use registrar::extract::curriculum::extract_curriculum;
use registrar::model::CurriculumCourse;

fn course_table(rows: &[(&str, &str, &str, &str)]) -> String {
    let mut html = String::from(
        "<table border=\"1\"><tr><th>Course No</th><th>Course Title</th>\
         <th>Units</th><th>Prerequisites</th><th>Category</th></tr>",
    );
    for (code, title, units, prereq) in rows {
        html.push_str(&format!(
            "<tr><td>{code}</td><td>{title}</td><td>{units}</td><td>{prereq}</td><td>CORE</td></tr>"
        ));
    }
    html.push_str("</table>");
    html
}

fn full_page() -> String {
    format!(
        r#"<html><body>
        <table><tr><td><a href="home.do">Home</a></td><td><a href="logout.do">Log Out</a></td></tr></table>
        <h2>Bachelor of Science in Legal Management</h2>
        <table>
            <tr><td><b>First Year</b></td></tr>
            <tr><td>First Semester{y1s1}</td></tr>
            <tr><td>Second Semester{y1s2}</td></tr>
            <tr><td><b>Second Year</b></td></tr>
            <tr><td>First Semester{y2s1}</td></tr>
            <tr><td>Intersession{y2i}</td></tr>
            <tr><td><b>Third Year</b></td></tr>
            <tr><td>{y3}</td></tr>
        </table>
        </body></html>"#,
        y1s1 = course_table(&[
            ("EN 11", "Communication in English I", "3", ""),
            ("MA 18A", "Principles of Modern Math I", "3", ""),
        ]),
        y1s2 = course_table(&[("EN 12", "Communication in English II", "3", "EN 11")]),
        y2s1 = course_table(&[("LLAW 11312018", "Obligations &amp; Contracts", "3", "")]),
        y2i = course_table(&[("PE 103", "Swimming", "0", "")]),
        y3 = course_table(&[("PHILO 101", "Ethics", "3", "")]),
    )
}

fn find<'a>(courses: &'a [CurriculumCourse], code: &str) -> &'a CurriculumCourse {
    courses
        .iter()
        .find(|c| c.course_code == code)
        .unwrap_or_else(|| panic!("course {code} not extracted"))
}

#[test]
fn test_full_page_year_semester_attribution() {
    let courses = extract_curriculum(&full_page(), "BS LM").into_records();
    assert_eq!(courses.len(), 6);

    assert_eq!(
        (find(&courses, "EN 11").year, find(&courses, "EN 11").semester),
        (1, 1)
    );
    assert_eq!(
        (find(&courses, "EN 12").year, find(&courses, "EN 12").semester),
        (1, 2)
    );
    // Intersession carries semester 0 under the current year.
    assert_eq!(
        (find(&courses, "PE 103").year, find(&courses, "PE 103").semester),
        (2, 0)
    );
    // A bare year heading with no semester label implies first semester.
    assert_eq!(
        (
            find(&courses, "PHILO 101").year,
            find(&courses, "PHILO 101").semester
        ),
        (3, 1)
    );
}

#[test]
fn test_full_page_normalization_applied() {
    let courses = extract_curriculum(&full_page(), "BS LM").into_records();

    // The embedded term code is stripped from the course number.
    let llaw = find(&courses, "LLAW 113");
    assert_eq!((llaw.year, llaw.semester), (2, 1));
    // Entities in the title are decoded.
    assert_eq!(llaw.title, "Obligations & Contracts");
    assert_eq!(llaw.degree_code, "BS LM");
}

#[test]
fn test_full_page_navigation_chrome_ignored() {
    let courses = extract_curriculum(&full_page(), "BS LM").into_records();
    assert!(courses.iter().all(|c| !c.course_code.contains("Home")));
    assert!(courses.iter().all(|c| !c.title.contains("Log Out")));
}

#[test]
fn test_prerequisite_text_preserved() {
    let courses = extract_curriculum(&full_page(), "BS LM").into_records();
    assert_eq!(find(&courses, "EN 12").prerequisite_text, "EN 11");
    assert_eq!(find(&courses, "EN 11").prerequisite_text, "");
}

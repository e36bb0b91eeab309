//! Entity-ID suppression patterns. `*` matches any run of characters,
//! everything else matches literally.

pub fn matches_pattern(pattern: &str, value: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let v: Vec<char> = value.chars().collect();

    let (mut pi, mut vi) = (0, 0);
    let mut star: Option<usize> = None;
    let mut resume = 0;

    while vi < v.len() {
        if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            resume = vi;
            pi += 1;
        } else if pi < p.len() && p[pi] == v[vi] {
            pi += 1;
            vi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            resume += 1;
            vi = resume;
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|c| *c == '*')
}

pub fn is_suppressed(patterns: &[String], entity_id: &str) -> bool {
    patterns.iter().any(|p| matches_pattern(p, entity_id))
}
